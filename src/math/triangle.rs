//! Triangles and the triangle/box overlap test used for voxelization

use crate::core::types::Vec3;
use super::aabb::Aabb;

/// A triangle with a material slot and per-vertex colors
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub vertices: [Vec3; 3],
    /// Linear RGB per vertex, multiplied with the material albedo
    pub colors: [Vec3; 3],
    pub material_id: u8,
}

impl Triangle {
    pub fn new(vertices: [Vec3; 3], material_id: u8) -> Self {
        Self { vertices, colors: [Vec3::ONE; 3], material_id }
    }

    /// Unnormalized geometric normal (length is twice the area)
    pub fn scaled_normal(&self) -> Vec3 {
        let [a, b, c] = self.vertices;
        (b - a).cross(c - a)
    }

    pub fn normal(&self) -> Vec3 {
        self.scaled_normal().normalize_or_zero()
    }

    pub fn area(&self) -> f32 {
        self.scaled_normal().length() * 0.5
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices)
    }

    pub fn average_color(&self) -> Vec3 {
        (self.colors[0] + self.colors[1] + self.colors[2]) / 3.0
    }

    pub fn is_finite(&self) -> bool {
        self.vertices.iter().all(|v| v.is_finite())
    }

    /// Separating-axis test against a box (Akenine-Möller).
    /// Touching counts as overlapping.
    pub fn overlaps_aabb(&self, aabb: &Aabb) -> bool {
        let center = aabb.center();
        let h = aabb.half_extent();
        let v = self.vertices.map(|p| p - center);

        // Box face normals
        let min = v[0].min(v[1]).min(v[2]);
        let max = v[0].max(v[1]).max(v[2]);
        if min.cmpgt(h).any() || max.cmplt(-h).any() {
            return false;
        }

        // Triangle plane
        let edges = [v[1] - v[0], v[2] - v[1], v[0] - v[2]];
        let n = edges[0].cross(edges[1]);
        if n.dot(v[0]).abs() > h.dot(n.abs()) {
            return false;
        }

        // Edge x box axis cross products
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            for edge in edges {
                if separates(axis.cross(edge), &v, h) {
                    return false;
                }
            }
        }

        true
    }
}

fn separates(axis: Vec3, v: &[Vec3; 3], h: Vec3) -> bool {
    if axis.length_squared() < 1e-24 {
        return false;
    }
    let p = [axis.dot(v[0]), axis.dot(v[1]), axis.dot(v[2])];
    let lo = p[0].min(p[1]).min(p[2]);
    let hi = p[0].max(p[1]).max(p[2]);
    let r = h.dot(axis.abs());
    lo > r || hi < -r
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::new(Vec3::ZERO, Vec3::ONE)
    }

    #[test]
    fn test_triangle_inside_box() {
        let tri = Triangle::new([Vec3::splat(0.2), Vec3::new(0.8, 0.2, 0.2), Vec3::new(0.2, 0.8, 0.5)], 0);
        assert!(tri.overlaps_aabb(&unit_box()));
    }

    #[test]
    fn test_triangle_far_away() {
        let tri = Triangle::new([Vec3::splat(3.0), Vec3::new(4.0, 3.0, 3.0), Vec3::new(3.0, 4.0, 3.0)], 0);
        assert!(!tri.overlaps_aabb(&unit_box()));
    }

    #[test]
    fn test_large_triangle_slicing_box() {
        // Vertices all outside, plane z = 0.5 cuts through the box
        let tri = Triangle::new([
            Vec3::new(-10.0, -10.0, 0.5),
            Vec3::new(10.0, -10.0, 0.5),
            Vec3::new(0.0, 10.0, 0.5),
        ], 0);
        assert!(tri.overlaps_aabb(&unit_box()));
    }

    #[test]
    fn test_edge_axis_separation() {
        // Bounding boxes overlap but the diagonal edge passes beside the box corner
        let tri = Triangle::new([
            Vec3::new(1.5, -0.5, 0.5),
            Vec3::new(1.5, 1.5, 0.5),
            Vec3::new(-0.5, 1.5 + 0.8, 0.5),
        ], 0);
        let corner_box = Aabb::new(Vec3::ZERO, Vec3::new(0.3, 0.3, 1.0));
        assert!(!tri.overlaps_aabb(&corner_box));
    }

    #[test]
    fn test_area_and_normal() {
        let tri = Triangle::new([Vec3::ZERO, Vec3::X, Vec3::Y], 0);
        assert!((tri.area() - 0.5).abs() < 1e-6);
        assert!((tri.normal() - Vec3::Z).length() < 1e-6);
    }
}
