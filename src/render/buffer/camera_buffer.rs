//! GPU uniform buffer for camera data

use bytemuck::{Pod, Zeroable};

use crate::core::camera::Camera;

/// Camera uniform data for GPU (must match shader struct exactly)
/// WGSL vec3 has 16-byte alignment, so position carries explicit padding
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    /// Inverse view-projection matrix (64 bytes, offset 0)
    pub view_proj_inv: [[f32; 4]; 4],
    /// Camera position in world space (12 bytes, offset 64)
    pub position: [f32; 3],
    /// Padding to 80 bytes
    pub _pad: f32,
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view_proj_inv: camera.view_projection_inverse().to_cols_array_2d(),
            position: camera.position.to_array(),
            _pad: 0.0,
        }
    }
}

/// GPU buffer for camera uniform
pub struct CameraBuffer {
    buffer: wgpu::Buffer,
}

impl CameraBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("camera_uniform"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer }
    }

    /// Update buffer with camera data
    pub fn update(&self, queue: &wgpu::Queue, camera: &Camera) {
        let uniform = CameraUniform::from_camera(camera);
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&uniform));
    }

    /// Get the raw buffer
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_size() {
        // Must be exactly 80 bytes to match WGSL struct layout
        assert_eq!(std::mem::size_of::<CameraUniform>(), 80);
    }

    #[test]
    fn test_from_camera() {
        let camera = Camera::default();
        let uniform = CameraUniform::from_camera(&camera);
        assert_eq!(uniform.position, camera.position.to_array());
        assert_eq!(
            uniform.view_proj_inv,
            camera.view_projection_inverse().to_cols_array_2d()
        );
    }
}
