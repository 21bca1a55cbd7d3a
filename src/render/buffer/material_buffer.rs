//! Material table in a storage buffer

use bytemuck::{Pod, Zeroable};

use crate::scene::{MAX_MATERIALS, Material};

/// Must match `Material` in the WGSL shaders
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub albedo: [f32; 4],
    pub emission: [f32; 4],
}

impl From<&Material> for GpuMaterial {
    fn from(material: &Material) -> Self {
        Self {
            albedo: material.albedo.extend(1.0).to_array(),
            emission: material.emission.extend(0.0).to_array(),
        }
    }
}

/// Fixed-capacity table; unused slots stay zeroed
pub struct MaterialBuffer {
    buffer: wgpu::Buffer,
    uploaded: Vec<Material>,
}

impl MaterialBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("materials"),
            size: (MAX_MATERIALS * std::mem::size_of::<GpuMaterial>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            uploaded: Vec::new(),
        }
    }

    /// Write `materials` unless they are already on the device
    pub fn update(&mut self, queue: &wgpu::Queue, materials: &[Material]) {
        if self.uploaded.as_slice() == materials {
            return;
        }
        let mut table = vec![GpuMaterial::default(); MAX_MATERIALS];
        for (slot, material) in table.iter_mut().zip(materials) {
            *slot = material.into();
        }
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&table));
        self.uploaded = materials.to_vec();
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_layout() {
        assert_eq!(std::mem::size_of::<GpuMaterial>(), 32);
        let gpu = GpuMaterial::from(&Material {
            albedo: Vec3::new(0.1, 0.2, 0.3),
            emission: Vec3::splat(4.0),
        });
        assert_eq!(gpu.albedo, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(gpu.emission, [4.0, 4.0, 4.0, 0.0]);
    }
}
