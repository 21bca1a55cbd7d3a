//! svoview - sparse voxel octree viewer with background scene loading and
//! progressive path tracing

pub mod core;
pub mod math;
pub mod render;
pub mod scene;
pub mod session;
pub mod voxel;
pub mod worker;
