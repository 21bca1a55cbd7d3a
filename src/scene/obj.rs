//! Wavefront OBJ/MTL loading into triangles

use std::path::Path;

use glam::Vec3;

use super::material::{MAX_MATERIALS, Material};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::Triangle;

/// Triangle soup plus the material table its ids index into.
/// Material 0 is always the default material.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
    pub materials: Vec<Material>,
}

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

impl Mesh {
    /// Read an OBJ file; `mtllib` paths resolve next to it
    pub fn load_obj(path: &Path) -> Result<Self> {
        let (models, materials) = tobj::load_obj(path, &load_options())
            .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;
        from_models(&models, materials)
    }
}

/// Parse OBJ text. Without a `base_dir`, `mtllib` statements are skipped.
pub fn parse_obj(source: &str, base_dir: Option<&Path>) -> Result<Mesh> {
    let mut reader = source.as_bytes();
    let (models, materials) = tobj::load_obj_buf(&mut reader, &load_options(), |file| match base_dir {
        Some(dir) => tobj::load_mtl(dir.join(file)),
        None => Err(tobj::LoadError::OpenFileFailed),
    })
    .map_err(|e| Error::Load(format!("malformed OBJ: {e}")))?;
    from_models(&models, materials)
}

/// Parse MTL text into named materials, in definition order
pub fn parse_mtl(source: &str) -> Result<Vec<(String, Material)>> {
    let (materials, _) = tobj::load_mtl_buf(&mut source.as_bytes())
        .map_err(|e| Error::Load(format!("malformed MTL: {e}")))?;
    Ok(materials.iter().map(|m| (m.name.clone(), convert_material(m))).collect())
}

fn from_models(
    models: &[tobj::Model],
    materials: std::result::Result<Vec<tobj::Material>, tobj::LoadError>,
) -> Result<Mesh> {
    let library = materials.unwrap_or_else(|e| {
        if models.iter().any(|m| m.mesh.material_id.is_some()) {
            log::warn!("material library unusable ({e}), using the default material");
        }
        Vec::new()
    });

    let mut table = vec![Material::default()];
    for material in &library {
        if table.len() >= MAX_MATERIALS {
            log::warn!("material table full, '{}' uses the default", material.name);
            break;
        }
        table.push(convert_material(material));
    }

    let mut triangles = Vec::new();
    for model in models {
        let mesh = &model.mesh;
        let material_id = match mesh.material_id {
            Some(index) if index + 1 < table.len() => (index + 1) as u8,
            _ => 0,
        };
        let albedo = table[material_id as usize].albedo;
        let vertex_count = mesh.positions.len() / 3;
        let has_colors = mesh.vertex_color.len() == mesh.positions.len();

        for corners in mesh.indices.chunks_exact(3) {
            let mut vertices = [Vec3::ZERO; 3];
            let mut colors = [Vec3::ONE; 3];
            for (slot, &index) in corners.iter().enumerate() {
                let i = index as usize;
                if i >= vertex_count {
                    return Err(Error::Load(format!(
                        "'{}': face index {} out of range ({vertex_count} vertices)",
                        model.name,
                        i + 1
                    )));
                }
                vertices[slot] = Vec3::from_slice(&mesh.positions[i * 3..i * 3 + 3]);
                if has_colors {
                    colors[slot] = Vec3::from_slice(&mesh.vertex_color[i * 3..i * 3 + 3]);
                }
            }
            triangles.push(Triangle {
                vertices,
                colors: colors.map(|c| c * albedo),
                material_id,
            });
        }
    }

    Ok(Mesh { triangles, materials: table })
}

fn convert_material(material: &tobj::Material) -> Material {
    let defaults = Material::default();
    let albedo = material.diffuse.map_or(defaults.albedo, Vec3::from_array);
    let emission = match material.unknown_param.get("Ke") {
        Some(value) => parse_rgb(value).unwrap_or_else(|| {
            log::warn!("material '{}': malformed Ke '{value}'", material.name);
            Vec3::ZERO
        }),
        None => Vec3::ZERO,
    };
    Material { albedo, emission }
}

fn parse_rgb(value: &str) -> Option<Vec3> {
    let values: Vec<f32> = value
        .split_whitespace()
        .map(|a| a.parse().ok())
        .collect::<Option<_>>()?;
    match values.as_slice() {
        [v] => Some(Vec3::splat(*v)),
        [r, g, b, ..] => Some(Vec3::new(*r, *g, *b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
# a unit quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
";

    #[test]
    fn test_quad_is_triangulated() {
        let mesh = parse_obj(QUAD, None).unwrap();
        assert_eq!(mesh.triangles.len(), 2);
        assert_eq!(mesh.materials.len(), 1);
        assert!(mesh.triangles.iter().all(|t| t.material_id == 0));
    }

    #[test]
    fn test_negative_and_slashed_indices() {
        let source = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf -3//1 -2//1 -1//1\nf 1//1 2//1 3//1\n";
        let mesh = parse_obj(source, None).unwrap();
        assert_eq!(mesh.triangles.len(), 2);
        assert_eq!(mesh.triangles[0].vertices, mesh.triangles[1].vertices);
    }

    #[test]
    fn test_vertex_colors() {
        let source = "v 0 0 0 1 0 0\nv 1 0 0 1 0 0\nv 0 1 0 1 0 0\nf 1 2 3\n";
        let mesh = parse_obj(source, None).unwrap();
        let color = mesh.triangles[0].average_color();
        assert!((color - Vec3::new(0.8, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_malformed_input_is_a_load_error() {
        for source in ["v 0 0 0\nf 1 2 3\n", "v 0 zero 0\n"] {
            let err = parse_obj(source, None).unwrap_err();
            assert!(matches!(err, Error::Load(_)), "{err}");
        }
        let err = Mesh::load_obj(Path::new("/nonexistent/scene.obj")).unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }

    #[test]
    fn test_mtl_parsing() {
        let materials = parse_mtl("newmtl red\nKd 1 0 0\n\nnewmtl lamp\nKd 1 1 1\nKe 4 4 4\n").unwrap();
        assert_eq!(materials.len(), 2);
        assert_eq!(materials[0].0, "red");
        assert_eq!(materials[0].1.albedo, Vec3::X);
        assert!(!materials[0].1.is_emissive());
        assert_eq!(materials[1].1.emission, Vec3::splat(4.0));
    }

    #[test]
    fn test_mtllib_and_usemtl() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.mtl"), "newmtl lamp\nKd 0.5 0.5 0.5\nKe 2 2 2\n").unwrap();
        let source = "mtllib m.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\nusemtl lamp\nf 1 2 3\n";
        std::fs::write(dir.path().join("s.obj"), source).unwrap();

        let mesh = Mesh::load_obj(&dir.path().join("s.obj")).unwrap();
        assert_eq!(mesh.materials.len(), 2);
        assert!(mesh.materials[1].is_emissive());
        let ids: Vec<u8> = mesh.triangles.iter().map(|t| t.material_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!((mesh.triangles[1].average_color() - Vec3::splat(0.5)).length() < 1e-6);
    }

    #[test]
    fn test_material_table_is_capped() {
        let mtl: String = (0..300).map(|i| format!("newmtl m{i}\nKd 0.1 0.2 0.3\n")).collect();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("many.mtl"), mtl).unwrap();
        let source = format!("mtllib many.mtl\nusemtl m299\n{QUAD}");
        let mesh = parse_obj(&source, Some(dir.path())).unwrap();
        assert_eq!(mesh.materials.len(), MAX_MATERIALS);
        assert!(mesh.triangles.iter().all(|t| t.material_id == 0));
    }

    #[test]
    fn test_missing_mtllib_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = format!("mtllib missing.mtl\n{QUAD}");
        let mesh = parse_obj(&source, Some(dir.path())).unwrap();
        assert_eq!(mesh.triangles.len(), 2);
        assert_eq!(mesh.materials.len(), 1);
    }
}
