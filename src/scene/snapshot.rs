//! Immutable scene state handed to the path tracer

use glam::{Mat4, Vec2, Vec3};

use super::description::{Lighting, SceneSettings};
use super::material::Material;
use crate::core::camera::{Camera, primary_ray};
use crate::math::Ray;

/// Camera state frozen at the moment a trace starts
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraSnapshot {
    pub view_proj_inverse: Mat4,
    pub position: Vec3,
}

impl CameraSnapshot {
    pub fn capture(camera: &Camera) -> Self {
        Self {
            view_proj_inverse: camera.view_projection_inverse(),
            position: camera.position,
        }
    }

    /// Primary ray through normalized device coordinates
    pub fn ray(&self, ndc: Vec2) -> Ray {
        primary_ray(&self.view_proj_inverse, self.position, ndc)
    }
}

/// Plain-data copy of everything a path trace reads
#[derive(Clone, Debug, PartialEq)]
pub struct SceneSnapshot {
    pub camera: CameraSnapshot,
    pub lighting: Lighting,
    pub materials: Vec<Material>,
    pub width: u32,
    pub height: u32,
    pub max_bounces: u32,
}

impl SceneSnapshot {
    pub fn capture(settings: &SceneSettings, camera: &Camera, width: u32, height: u32) -> Self {
        Self {
            camera: CameraSnapshot::capture(camera),
            lighting: settings.lighting,
            materials: settings.materials.clone(),
            width: width.max(1),
            height: height.max(1),
            max_bounces: settings.max_bounces,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Emission of a material id, zero when out of range
    pub fn emission(&self, material_id: u8) -> Vec3 {
        self.materials
            .get(material_id as usize)
            .map_or(Vec3::ZERO, |m| m.emission)
    }
}
