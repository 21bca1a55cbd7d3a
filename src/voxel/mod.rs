//! Voxel data structures and the sparse voxel octree

pub mod voxel;
pub mod svo;

pub use voxel::Voxel;
pub use svo::{Octree, OctreeNode, OctreeBuilder};
