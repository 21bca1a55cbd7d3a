//! Scene files: a bare OBJ, or a JSON description pointing at one

use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::material::Material;
use super::obj::Mesh;
use crate::core::error::Error;
use crate::core::types::Result;

pub const DEFAULT_MAX_BOUNCES: u32 = 4;

/// Initial camera placement from a scene file
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraSetup {
    pub position: [f32; 3],
    pub target: [f32; 3],
    #[serde(default = "default_fov")]
    pub fov_y_degrees: f32,
}

fn default_fov() -> f32 {
    60.0
}

/// Sun and sky parameters shared by both tracers
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lighting {
    /// Direction toward the sun
    pub sun_direction: [f32; 3],
    /// Linear RGB
    pub sun_color: [f32; 3],
    pub sun_intensity: f32,
    pub sky_color: [f32; 3],
    /// Constant fill term for the interactive view
    pub ambient: f32,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            sun_direction: [0.4, 1.0, 0.3],
            sun_color: [1.0, 0.95, 0.9],
            sun_intensity: 3.0,
            sky_color: [0.55, 0.7, 0.9],
            ambient: 0.15,
        }
    }
}

impl Lighting {
    pub fn sun_direction(&self) -> Vec3 {
        Vec3::from(self.sun_direction).try_normalize().unwrap_or(Vec3::Y)
    }

    /// Sun color scaled by intensity
    pub fn sun_radiance(&self) -> Vec3 {
        Vec3::from(self.sun_color) * self.sun_intensity
    }

    pub fn sky_color(&self) -> Vec3 {
        Vec3::from(self.sky_color)
    }
}

/// On-disk JSON scene description
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneDescription {
    /// OBJ file, relative to the description
    pub geometry: PathBuf,
    #[serde(default)]
    pub camera: Option<CameraSetup>,
    #[serde(default)]
    pub lighting: Lighting,
    #[serde(default = "default_max_bounces")]
    pub max_bounces: u32,
}

fn default_max_bounces() -> u32 {
    DEFAULT_MAX_BOUNCES
}

/// Everything about a scene except its triangles; kept after the octree is built
#[derive(Clone, Debug, PartialEq)]
pub struct SceneSettings {
    pub source: PathBuf,
    pub materials: Vec<Material>,
    pub camera: Option<CameraSetup>,
    pub lighting: Lighting,
    pub max_bounces: u32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            materials: vec![Material::default()],
            camera: None,
            lighting: Lighting::default(),
            max_bounces: DEFAULT_MAX_BOUNCES,
        }
    }
}

impl SceneSettings {
    pub fn is_emissive(&self, material_id: u8) -> bool {
        self.materials
            .get(material_id as usize)
            .is_some_and(Material::is_emissive)
    }
}

/// Parsed scene file
#[derive(Clone, Debug)]
pub struct Scene {
    pub mesh: Mesh,
    pub settings: SceneSettings,
}

impl Scene {
    /// Load `.obj` or `.json` by extension
    pub fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("obj") => {
                let mesh = Mesh::load_obj(path)?;
                Ok(Self::from_mesh(path, mesh, None, Lighting::default(), DEFAULT_MAX_BOUNCES))
            }
            Some("json") => Self::load_description(path),
            _ => Err(Error::Load(format!(
                "unsupported scene format: {}",
                path.display()
            ))),
        }
    }

    fn load_description(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Load(format!("cannot read {}: {e}", path.display())))?;
        let description: SceneDescription = serde_json::from_str(&json)
            .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;

        let geometry = match path.parent() {
            Some(dir) => dir.join(&description.geometry),
            None => description.geometry.clone(),
        };
        let mesh = Mesh::load_obj(&geometry)?;
        Ok(Self::from_mesh(
            path,
            mesh,
            description.camera,
            description.lighting,
            description.max_bounces,
        ))
    }

    fn from_mesh(
        path: &Path,
        mut mesh: Mesh,
        camera: Option<CameraSetup>,
        lighting: Lighting,
        max_bounces: u32,
    ) -> Self {
        let materials = std::mem::take(&mut mesh.materials);
        Self {
            mesh,
            settings: SceneSettings {
                source: path.to_path_buf(),
                materials,
                camera,
                lighting,
                max_bounces,
            },
        }
    }
}
