//! Geometry helpers shared by the octree builder and the CPU tracer

pub mod aabb;
pub mod ray;
pub mod triangle;
pub mod sampling;

pub use aabb::Aabb;
pub use ray::Ray;
pub use triangle::Triangle;
