//! Camera for 3D rendering

use crate::core::types::{Vec2, Vec3, Vec4, Mat4, Quat};
use crate::math::Ray;

/// Camera with position, rotation, and projection parameters
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// World position
    pub position: Vec3,
    /// Rotation as quaternion
    pub rotation: Quat,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
}

impl Camera {
    /// Create a new camera looking down -Z
    pub fn new(position: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near: 0.01,
            far: 1000.0,
        }
    }

    /// Create camera looking at a target
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let mut camera = Self::new(position, 60.0, 16.0 / 9.0);
        camera.point_at(target, up);
        camera
    }

    /// Rotate in place so the camera faces `target`
    pub fn point_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize_or(-Vec3::Z);
        let right = forward.cross(up).normalize_or(Vec3::X);
        let up = right.cross(forward);
        self.rotation = Quat::from_mat3(&glam::Mat3::from_cols(right, up, -forward));
    }

    /// Get view matrix (world to camera space)
    pub fn view_matrix(&self) -> Mat4 {
        let rotation_matrix = Mat4::from_quat(self.rotation.conjugate());
        let translation_matrix = Mat4::from_translation(-self.position);
        rotation_matrix * translation_matrix
    }

    /// Get projection matrix (camera to clip space)
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get inverse view-projection matrix (for ray generation)
    pub fn view_projection_inverse(&self) -> Mat4 {
        self.view_projection().inverse()
    }

    /// Get forward direction (negative Z in camera space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Get right direction (positive X in camera space)
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Get up direction (positive Y in camera space)
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Set rotation from euler angles (yaw, pitch in radians)
    pub fn set_rotation_euler(&mut self, yaw: f32, pitch: f32) {
        self.rotation = Quat::from_euler(glam::EulerRot::YXZ, yaw, pitch, 0.0);
    }

    /// Yaw and pitch matching the current rotation
    pub fn euler_angles(&self) -> (f32, f32) {
        let (yaw, pitch, _) = self.rotation.to_euler(glam::EulerRot::YXZ);
        (yaw, pitch)
    }

    /// Update aspect ratio (call on window resize)
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.aspect = width / height;
        }
    }

    /// Place the camera so a sphere of `radius` around `center` fills the view
    pub fn frame_bounds(&mut self, center: Vec3, radius: f32) {
        let distance = radius / (self.fov_y * 0.5).tan().max(1e-3) * 1.1;
        self.position = center + Vec3::new(0.6, 0.45, 1.0).normalize() * distance;
        self.near = (distance * 1e-3).max(1e-4);
        self.far = distance + radius * 4.0;
        self.point_at(center, Vec3::Y);
    }

    /// World-space ray through a point in normalized device coordinates
    pub fn ray_through_ndc(&self, ndc: Vec2) -> Ray {
        primary_ray(&self.view_projection_inverse(), self.position, ndc)
    }
}

/// Unproject an NDC point onto the far plane and build a ray from `origin`
pub fn primary_ray(view_proj_inv: &Mat4, origin: Vec3, ndc: Vec2) -> Ray {
    let far = *view_proj_inv * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
    let target = far.truncate() / far.w;
    Ray::new(origin, (target - origin).normalize())
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 5.0), 60.0, 16.0 / 9.0)
    }
}
