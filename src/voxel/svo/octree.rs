//! Sparse Voxel Octree container

use std::collections::VecDeque;

use glam::Vec3;

use super::node::OctreeNode;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::Aabb;
use crate::voxel::voxel::Voxel;

/// Sparse Voxel Octree stored as a breadth-first node array.
///
/// Immutable once built. The root is node 0 and covers `bounds`, a cube; leaves
/// only exist at `max_depth`.
#[derive(Debug, Clone, PartialEq)]
pub struct Octree {
    /// All octree nodes (root is at index 0)
    nodes: Vec<OctreeNode>,
    /// World-space cube covered by the root
    bounds: Aabb,
    /// Depth of every leaf
    max_depth: u32,
}

impl Octree {
    /// Octree holding nothing: a single empty root
    pub fn empty(bounds: Aabb, max_depth: u32) -> Self {
        Self {
            nodes: vec![OctreeNode::empty()],
            bounds,
            max_depth,
        }
    }

    pub(crate) fn from_nodes(nodes: Vec<OctreeNode>, bounds: Aabb, max_depth: u32) -> Self {
        Self { nodes, bounds, max_depth }
    }

    /// Get root node
    pub fn root(&self) -> &OctreeNode {
        &self.nodes[0]
    }

    /// Get node by index
    pub fn node(&self, index: u32) -> Option<&OctreeNode> {
        self.nodes.get(index as usize)
    }

    /// Get all nodes as slice (for GPU upload)
    pub fn nodes(&self) -> &[OctreeNode] {
        &self.nodes
    }

    /// Raw node bytes in upload layout
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Edge length of a leaf voxel
    pub fn voxel_size(&self) -> f32 {
        self.bounds.size().x / (1u32 << self.max_depth) as f32
    }

    /// Calculate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<OctreeNode>() * self.nodes.len()
    }

    /// Check if octree is empty (only has empty root)
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.nodes[0].is_empty()
    }

    /// Number of nodes at each depth, index 0 being the root
    pub fn depth_histogram(&self) -> Vec<usize> {
        let mut histogram = vec![0; self.max_depth as usize + 1];
        let mut queue = VecDeque::from([(0u32, 0usize)]);
        while let Some((index, depth)) = queue.pop_front() {
            let Some(node) = self.node(index) else { continue };
            if let Some(slot) = histogram.get_mut(depth) {
                *slot += 1;
            }
            for octant in 0..8 {
                if let Some(child) = node.child_index(octant) {
                    queue.push_back((child, depth + 1));
                }
            }
        }
        histogram
    }

    /// Leaf voxel containing `point`, or None for empty space
    pub fn sample(&self, point: Vec3) -> Option<Voxel> {
        if !self.bounds.contains_point(point) {
            return None;
        }
        let mut index = 0u32;
        let mut cell = self.bounds;
        loop {
            let node = self.node(index)?;
            if node.is_leaf() {
                return Some(node.voxel);
            }
            let octant = cell.octant_of(point);
            index = node.child_index(octant)?;
            cell = cell.child_octant(octant);
        }
    }

    /// Check structural invariants: child ranges in bounds, children stored after
    /// their parent, every leaf at `max_depth`, every node reachable exactly once.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::Load("octree has no root".into()));
        }
        let len = self.nodes.len() as u64;
        let mut visited = 0usize;
        let mut queue = VecDeque::from([(0u32, 0u32)]);
        while let Some((index, depth)) = queue.pop_front() {
            visited += 1;
            let node = &self.nodes[index as usize];
            if node.is_leaf() {
                if node.child_mask() != 0 {
                    return Err(Error::Load(format!("leaf {index} has children")));
                }
                if depth != self.max_depth {
                    return Err(Error::Load(format!(
                        "leaf {index} at depth {depth}, expected {}",
                        self.max_depth
                    )));
                }
                continue;
            }
            if node.child_mask() == 0 {
                if index != 0 {
                    return Err(Error::Load(format!("empty interior node {index}")));
                }
                continue;
            }
            if depth >= self.max_depth {
                return Err(Error::Load(format!("interior node {index} at leaf depth")));
            }
            let end = node.child_offset as u64 + node.child_count() as u64;
            if node.child_offset <= index || end > len {
                return Err(Error::Load(format!(
                    "node {index} children {}..{end} out of bounds",
                    node.child_offset
                )));
            }
            for child in node.child_offset..end as u32 {
                queue.push_back((child, depth + 1));
            }
        }
        if visited != self.nodes.len() {
            return Err(Error::Load(format!(
                "{} of {} nodes reachable from root",
                visited,
                self.nodes.len()
            )));
        }
        Ok(())
    }
}
