//! Axis-aligned bounding box

use crate::core::types::Vec3;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Box that contains nothing; `expand` grows it from the first point
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.expand(p);
        }
        aabb
    }

    /// True until at least one point has been added
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn half_extent(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Inclusive containment test
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Cube sharing this box's center whose edge is the longest side grown by
    /// `padding` (a fraction of that side). Degenerate boxes get a unit edge.
    pub fn bounding_cube(&self, padding: f32) -> Aabb {
        let longest = self.size().max_element();
        let edge = if longest > f32::EPSILON { longest * (1.0 + padding) } else { 1.0 };
        let half = Vec3::splat(edge * 0.5);
        let center = self.center();
        Aabb::new(center - half, center + half)
    }

    /// Child octant box for octree subdivision
    /// index: 0-7, bit 0 = +x, bit 1 = +y, bit 2 = +z
    pub fn child_octant(&self, index: u8) -> Aabb {
        debug_assert!(index < 8);
        let center = self.center();
        let pick = |bit: u8, lo: f32, mid: f32, hi: f32| {
            if index & bit != 0 { (mid, hi) } else { (lo, mid) }
        };
        let (x0, x1) = pick(1, self.min.x, center.x, self.max.x);
        let (y0, y1) = pick(2, self.min.y, center.y, self.max.y);
        let (z0, z1) = pick(4, self.min.z, center.z, self.max.z);
        Aabb::new(Vec3::new(x0, y0, z0), Vec3::new(x1, y1, z1))
    }

    /// Octant index of `p` relative to the box center
    pub fn octant_of(&self, p: Vec3) -> u8 {
        let c = self.center();
        (p.x >= c.x) as u8 | ((p.y >= c.y) as u8) << 1 | ((p.z >= c.z) as u8) << 2
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points_and_empty() {
        assert!(Aabb::EMPTY.is_empty());
        let aabb = Aabb::from_points([Vec3::ZERO, Vec3::new(2.0, 1.0, -1.0)]);
        assert!(!aabb.is_empty());
        assert_eq!(aabb.min, Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(aabb.max, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn test_bounding_cube_is_cubic_and_contains() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 1.0, 2.0));
        let cube = aabb.bounding_cube(0.0);
        assert_eq!(cube.size(), Vec3::splat(4.0));
        assert!(cube.contains_point(aabb.min) && cube.contains_point(aabb.max));
    }

    #[test]
    fn test_child_octant_and_lookup_agree() {
        let parent = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        assert_eq!(parent.child_octant(0), Aabb::new(Vec3::ZERO, Vec3::ONE));
        assert_eq!(parent.child_octant(7), Aabb::new(Vec3::ONE, Vec3::splat(2.0)));
        for i in 0..8u8 {
            let child = parent.child_octant(i);
            assert_eq!(parent.octant_of(child.center()), i);
        }
    }
}
