//! GPU buffer management

pub mod octree_buffer;
pub mod camera_buffer;
pub mod material_buffer;

pub use octree_buffer::{OctreeBuffer, OctreeInfo};
pub use camera_buffer::{CameraBuffer, CameraUniform};
pub use material_buffer::{GpuMaterial, MaterialBuffer};
