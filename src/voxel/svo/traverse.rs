//! Ray traversal of the linear octree.
//!
//! Front-to-back walk with an explicit stack: at each interior node the children
//! the ray enters are sorted by entry distance and pushed far-to-near, so the
//! first leaf popped is the closest hit. `shaders/common.wgsl` runs the same walk.

use glam::Vec3;

use super::octree::Octree;
use crate::math::{Aabb, Ray};
use crate::voxel::voxel::Voxel;

/// Stack entries needed for the deepest tree: 7 siblings per level plus one
pub const TRAVERSAL_STACK_SIZE: usize = 96;

/// Closest leaf hit along a ray
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// Distance to the leaf's entry face
    pub t: f32,
    pub position: Vec3,
    /// Axis-aligned normal of the face the ray entered through
    pub face_normal: Vec3,
    pub voxel: Voxel,
    pub node_index: u32,
}

impl Octree {
    pub fn raycast(&self, ray: &Ray) -> Option<RayHit> {
        self.raycast_within(ray, f32::INFINITY)
    }

    /// Closest hit with `t <= t_max`
    pub fn raycast_within(&self, ray: &Ray, t_max: f32) -> Option<RayHit> {
        if self.root().is_empty() {
            return None;
        }

        let mut stack = [(0u32, Aabb::EMPTY); TRAVERSAL_STACK_SIZE];
        let mut len = 1;
        stack[0] = (0, self.bounds());

        while len > 0 {
            len -= 1;
            let (index, cell) = stack[len];
            let Some((t_near, _)) = ray.intersects_aabb(&cell) else { continue };
            if t_near > t_max {
                continue;
            }
            let Some(node) = self.node(index) else { continue };

            if node.is_leaf() {
                return Some(RayHit {
                    t: t_near,
                    position: ray.at(t_near),
                    face_normal: entry_face_normal(ray, &cell),
                    voxel: node.voxel,
                    node_index: index,
                });
            }

            // Children hit by the ray, kept sorted by entry distance
            let mut hits = [(0.0f32, 0u32, Aabb::EMPTY); 8];
            let mut count = 0;
            for octant in 0..8 {
                let Some(child) = node.child_index(octant) else { continue };
                let child_cell = cell.child_octant(octant);
                let Some((t, _)) = ray.intersects_aabb(&child_cell) else { continue };
                if t > t_max {
                    continue;
                }
                let mut slot = count;
                while slot > 0 && hits[slot - 1].0 > t {
                    hits[slot] = hits[slot - 1];
                    slot -= 1;
                }
                hits[slot] = (t, child, child_cell);
                count += 1;
            }

            debug_assert!(len + count <= TRAVERSAL_STACK_SIZE);
            for &(_, child, child_cell) in hits[..count].iter().rev() {
                if len == TRAVERSAL_STACK_SIZE {
                    break;
                }
                stack[len] = (child, child_cell);
                len += 1;
            }
        }
        None
    }
}

fn entry_face_normal(ray: &Ray, cell: &Aabb) -> Vec3 {
    let t1 = (cell.min - ray.origin) * ray.inv_direction;
    let t2 = (cell.max - ray.origin) * ray.inv_direction;
    let entry = t1.min(t2);
    let axis = if entry.x >= entry.y && entry.x >= entry.z {
        0
    } else if entry.y >= entry.z {
        1
    } else {
        2
    };
    let mut normal = Vec3::ZERO;
    normal[axis] = -ray.direction[axis].signum();
    normal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::svo::OctreeNode;

    /// Depth-1 tree with leaves in octants 0 and 7 of the unit cube
    fn diagonal_tree() -> Octree {
        let a = Voxel::new(Vec3::X, Vec3::Y, 0);
        let b = Voxel::new(Vec3::Z, Vec3::Y, 1);
        let nodes = vec![
            OctreeNode::internal(0b1000_0001, 1, a),
            OctreeNode::leaf(a),
            OctreeNode::leaf(b),
        ];
        Octree::from_nodes(nodes, Aabb::new(Vec3::ZERO, Vec3::ONE), 1)
    }

    #[test]
    fn test_hits_nearest_leaf_first() {
        let octree = diagonal_tree();
        let from_low = Ray::new(Vec3::splat(-1.0), Vec3::ONE.normalize());
        let hit = octree.raycast(&from_low).expect("diagonal ray should hit");
        assert_eq!(hit.voxel.material_id, 0);
        assert_eq!(hit.node_index, 1);

        let from_high = Ray::new(Vec3::splat(2.0), -Vec3::ONE.normalize());
        let hit = octree.raycast(&from_high).expect("diagonal ray should hit");
        assert_eq!(hit.voxel.material_id, 1);
    }

    #[test]
    fn test_face_normal_and_distance() {
        let octree = diagonal_tree();
        let ray = Ray::new(Vec3::new(-1.0, 0.25, 0.25), Vec3::X);
        let hit = octree.raycast(&ray).expect("should hit octant 0");
        assert!((hit.t - 1.0).abs() < 1e-5);
        assert_eq!(hit.face_normal, -Vec3::X);
        assert!((hit.position - Vec3::new(0.0, 0.25, 0.25)).length() < 1e-5);
    }

    #[test]
    fn test_miss_through_empty_octants() {
        let octree = diagonal_tree();
        // travels through octants 1 and 3 only
        let ray = Ray::new(Vec3::new(0.75, -1.0, 0.25), Vec3::Y);
        assert_eq!(octree.raycast(&ray), None);
    }

    #[test]
    fn test_t_max_limits_hit() {
        let octree = diagonal_tree();
        let ray = Ray::new(Vec3::new(-1.0, 0.25, 0.25), Vec3::X);
        assert!(octree.raycast_within(&ray, 0.5).is_none());
        assert!(octree.raycast_within(&ray, 1.5).is_some());
    }

    #[test]
    fn test_empty_octree_never_hits() {
        let octree = Octree::empty(Aabb::new(Vec3::ZERO, Vec3::ONE), 3);
        let ray = Ray::new(Vec3::new(0.5, 0.5, -1.0), Vec3::Z);
        assert_eq!(octree.raycast(&ray), None);
    }
}
