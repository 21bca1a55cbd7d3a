//! Surface materials referenced by voxel material ids

use glam::Vec3;

/// Material ids are stored in a byte
pub const MAX_MATERIALS: usize = 256;

/// Diffuse surface with optional emission (linear RGB)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub albedo: Vec3,
    pub emission: Vec3,
}

impl Material {
    pub const fn diffuse(albedo: Vec3) -> Self {
        Self { albedo, emission: Vec3::ZERO }
    }

    pub fn is_emissive(&self) -> bool {
        self.emission.max_element() > 0.0
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::diffuse(Vec3::splat(0.8))
    }
}
