//! Scene input: geometry, materials, lighting and camera defaults

pub mod material;
pub mod obj;
pub mod description;
pub mod snapshot;

pub use material::{MAX_MATERIALS, Material};
pub use obj::Mesh;
pub use description::{CameraSetup, Lighting, Scene, SceneSettings};
pub use snapshot::{CameraSnapshot, SceneSnapshot};
