//! Octree construction from triangle meshes

use std::collections::VecDeque;

use glam::Vec3;
use rayon::prelude::*;

use super::{MAX_OCTREE_LEVEL, Octree, OctreeNode};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::{Aabb, Triangle};
use crate::voxel::voxel::Voxel;

/// Fraction the mesh bounds are grown by when fitted into the root cube
pub const DOMAIN_PADDING: f32 = 0.01;

/// Levels above this depth are subdivided on the rayon pool
const PARALLEL_DEPTH: u32 = 2;

/// Pointer-based tree produced by voxelization, flattened afterwards
enum BuildNode {
    Leaf(Voxel),
    Interior {
        lod: Voxel,
        /// Non-empty children in ascending octant order
        children: Vec<(u8, BuildNode)>,
    },
}

impl BuildNode {
    fn voxel(&self) -> Voxel {
        match self {
            BuildNode::Leaf(voxel) => *voxel,
            BuildNode::Interior { lod, .. } => *lod,
        }
    }
}

/// Builder that voxelizes triangles into a sparse octree of fixed depth
#[derive(Clone, Debug)]
pub struct OctreeBuilder {
    max_depth: u32,
    padding: f32,
}

impl OctreeBuilder {
    /// Builder producing leaves at `max_depth` (1..=12)
    pub fn new(max_depth: u32) -> Result<Self> {
        if !(1..=MAX_OCTREE_LEVEL).contains(&max_depth) {
            return Err(Error::Load(format!(
                "octree level {max_depth} outside 1..={MAX_OCTREE_LEVEL}"
            )));
        }
        Ok(Self {
            max_depth,
            padding: DOMAIN_PADDING,
        })
    }

    pub fn with_padding(mut self, padding: f32) -> Self {
        self.padding = padding.max(0.0);
        self
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Root cube the triangles are fitted into
    pub fn domain(&self, triangles: &[Triangle]) -> Aabb {
        let bounds = Aabb::from_points(triangles.iter().flat_map(|t| t.vertices));
        bounds.bounding_cube(self.padding)
    }

    /// Build octree with no emissive materials
    pub fn build(&self, triangles: &[Triangle]) -> Result<Octree> {
        self.build_with_emission(triangles, |_| false)
    }

    /// Build octree; leaves whose material satisfies `is_emissive` get the emissive flag.
    ///
    /// Output is deterministic: the same triangles and depth give a byte-identical
    /// node array regardless of thread scheduling.
    pub fn build_with_emission<F>(&self, triangles: &[Triangle], is_emissive: F) -> Result<Octree>
    where
        F: Fn(u8) -> bool + Sync,
    {
        if triangles.is_empty() {
            return Err(Error::Load("mesh has no triangles".into()));
        }
        if let Some(index) = triangles.iter().position(|t| !t.is_finite()) {
            return Err(Error::Load(format!("triangle {index} has non-finite coordinates")));
        }
        if triangles.len() > u32::MAX as usize {
            return Err(Error::Load("mesh has too many triangles".into()));
        }

        let domain = self.domain(triangles);
        let all: Vec<u32> = (0..triangles.len() as u32).collect();
        let root = self.build_cell(triangles, &all, domain, 0, &is_emissive);

        let octree = match root {
            Some(root) => Octree::from_nodes(flatten(&root), domain, self.max_depth),
            None => Octree::empty(domain, self.max_depth),
        };
        log::debug!(
            "Voxelized {} triangles into {} nodes ({} leaves) at depth {}",
            triangles.len(),
            octree.node_count(),
            octree.leaf_count(),
            self.max_depth
        );
        Ok(octree)
    }

    fn build_cell<F>(
        &self,
        triangles: &[Triangle],
        candidates: &[u32],
        cell: Aabb,
        depth: u32,
        is_emissive: &F,
    ) -> Option<BuildNode>
    where
        F: Fn(u8) -> bool + Sync,
    {
        let inside: Vec<u32> = candidates
            .iter()
            .copied()
            .filter(|&i| triangles[i as usize].overlaps_aabb(&cell))
            .collect();
        if inside.is_empty() {
            return None;
        }

        if depth == self.max_depth {
            return Some(BuildNode::Leaf(leaf_voxel(triangles, &inside, is_emissive)));
        }

        let child = |octant: u8| {
            self.build_cell(triangles, &inside, cell.child_octant(octant), depth + 1, is_emissive)
                .map(|node| (octant, node))
        };
        // collect keeps octant order on both paths
        let children: Vec<(u8, BuildNode)> = if depth < PARALLEL_DEPTH {
            (0..8u8).into_par_iter().filter_map(child).collect()
        } else {
            (0..8u8).filter_map(child).collect()
        };
        if children.is_empty() {
            return None;
        }

        let lod = lod_voxel(children.iter().map(|(_, node)| node.voxel()));
        Some(BuildNode::Interior { lod, children })
    }
}

/// Average color, summed normal and lowest material of the overlapping triangles
fn leaf_voxel<F>(triangles: &[Triangle], inside: &[u32], is_emissive: &F) -> Voxel
where
    F: Fn(u8) -> bool,
{
    let mut color = Vec3::ZERO;
    let mut normal = Vec3::ZERO;
    let mut material = u8::MAX;
    for &i in inside {
        let triangle = &triangles[i as usize];
        color += triangle.average_color();
        normal += triangle.normal();
        material = material.min(triangle.material_id);
    }
    color /= inside.len() as f32;
    let normal = normal.try_normalize().unwrap_or(Vec3::Y);
    Voxel::new(color, normal, material).with_emissive(is_emissive(material))
}

fn lod_voxel(children: impl Iterator<Item = Voxel>) -> Voxel {
    let mut color = Vec3::ZERO;
    let mut normal = Vec3::ZERO;
    let mut material = u8::MAX;
    let mut emissive = false;
    let mut count = 0;
    for voxel in children {
        color += voxel.color();
        normal += voxel.normal();
        material = material.min(voxel.material_id);
        emissive |= voxel.is_emissive();
        count += 1;
    }
    color /= count.max(1) as f32;
    let normal = normal.try_normalize().unwrap_or(Vec3::Y);
    Voxel::new(color, normal, material).with_emissive(emissive)
}

/// Breadth-first flattening; siblings end up contiguous in octant order
fn flatten(root: &BuildNode) -> Vec<OctreeNode> {
    let mut nodes = vec![OctreeNode::empty()];
    let mut queue = VecDeque::from([(0usize, root)]);
    while let Some((index, node)) = queue.pop_front() {
        nodes[index] = match node {
            BuildNode::Leaf(voxel) => OctreeNode::leaf(*voxel),
            BuildNode::Interior { lod, children } => {
                let offset = nodes.len() as u32;
                let mut mask = 0u8;
                for (octant, child) in children {
                    mask |= 1 << octant;
                    queue.push_back((nodes.len(), child));
                    nodes.push(OctreeNode::empty());
                }
                OctreeNode::internal(mask, offset, *lod)
            }
        };
    }
    nodes
}
