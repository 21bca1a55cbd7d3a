//! Sparse Voxel Octree node

use bytemuck::{Pod, Zeroable};

use crate::voxel::voxel::Voxel;

/// Flag bit marking a node as a leaf at the octree's maximum depth
pub const LEAF_FLAG: u32 = 1 << 8;

/// Octree node - exactly 16 bytes
///
/// Layout:
/// - flags (4 bytes): bits 0-7 child mask, bit 8 leaf, 9-31 reserved
/// - child_offset (4 bytes): index of the first child in the node array
/// - voxel (8 bytes): leaf attributes, or the LOD average for internal nodes
///
/// Children of a node are contiguous and sorted by octant index, so child `i`
/// lives at `child_offset + popcount(mask & ((1 << i) - 1))`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct OctreeNode {
    pub flags: u32,
    pub child_offset: u32,
    pub voxel: Voxel,
}

impl OctreeNode {
    /// Create an empty node
    pub const fn empty() -> Self {
        Self {
            flags: 0,
            child_offset: 0,
            voxel: Voxel::EMPTY,
        }
    }

    pub fn leaf(voxel: Voxel) -> Self {
        Self {
            flags: LEAF_FLAG,
            child_offset: 0,
            voxel,
        }
    }

    pub fn internal(child_mask: u8, child_offset: u32, lod: Voxel) -> Self {
        Self {
            flags: child_mask as u32,
            child_offset,
            voxel: lod,
        }
    }

    /// Get child mask (bits 0-7)
    pub fn child_mask(&self) -> u8 {
        (self.flags & 0xFF) as u8
    }

    pub fn is_leaf(&self) -> bool {
        self.flags & LEAF_FLAG != 0
    }

    /// Neither a leaf nor a parent of anything
    pub fn is_empty(&self) -> bool {
        !self.is_leaf() && self.child_mask() == 0
    }

    /// Check if child at octant index exists
    pub fn has_child(&self, octant: u8) -> bool {
        debug_assert!(octant < 8);
        (self.child_mask() >> octant) & 1 != 0
    }

    /// Count number of children
    pub fn child_count(&self) -> u32 {
        self.child_mask().count_ones()
    }

    /// Array index of the child in `octant`, if present
    pub fn child_index(&self, octant: u8) -> Option<u32> {
        if !self.has_child(octant) {
            return None;
        }
        let below = self.child_mask() & ((1u8 << octant) - 1);
        Some(self.child_offset + below.count_ones())
    }
}
