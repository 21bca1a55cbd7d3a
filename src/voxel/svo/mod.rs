//! Sparse Voxel Octree implementation

pub mod node;
pub mod octree;
pub mod builder;
pub mod traverse;

/// Deepest supported subdivision level
pub const MAX_OCTREE_LEVEL: u32 = 12;

pub use node::OctreeNode;
pub use octree::Octree;
pub use builder::OctreeBuilder;
pub use traverse::RayHit;
