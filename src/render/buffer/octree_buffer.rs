//! GPU storage buffer for octree nodes

use bytemuck::{Pod, Zeroable};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::voxel::svo::{Octree, OctreeNode};

/// Octree placement and size (32 bytes, matches `OctreeInfo` in common.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct OctreeInfo {
    /// World-space min corner of the root cube
    pub bounds_min: [f32; 3],
    /// Edge length of the root cube
    pub root_size: f32,
    pub max_depth: u32,
    pub node_count: u32,
    pub voxel_size: f32,
    pub _pad: u32,
}

impl OctreeInfo {
    pub fn from_octree(octree: &Octree) -> Self {
        let bounds = octree.bounds();
        Self {
            bounds_min: bounds.min.to_array(),
            root_size: bounds.size().x,
            max_depth: octree.max_depth(),
            node_count: octree.node_count() as u32,
            voxel_size: octree.voxel_size(),
            _pad: 0,
        }
    }
}

/// Layout of bind group 1 in every tracing shader
pub fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("octree_bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

/// Fail with `DeviceResource` when the node array cannot be bound on this device
pub fn check_limits(limits: &wgpu::Limits, octree: &Octree) -> Result<()> {
    let size = octree.memory_usage() as u64;
    let binding_limit = limits.max_storage_buffer_binding_size as u64;
    let buffer_limit = limits.max_buffer_size;
    if size > binding_limit || size > buffer_limit {
        return Err(Error::DeviceResource(format!(
            "octree needs {}MB, device allows {}MB",
            size / 1024 / 1024,
            binding_limit.min(buffer_limit) / 1024 / 1024
        )));
    }
    Ok(())
}

/// Device-resident octree: node storage buffer plus its info uniform
pub struct OctreeBuffer {
    node_buffer: wgpu::Buffer,
    #[allow(dead_code)]
    info_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    info: OctreeInfo,
}

impl OctreeBuffer {
    /// Allocate and queue the node upload. The data lands with the next submit on `queue`.
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        octree: &Octree,
    ) -> Result<Self> {
        check_limits(&device.limits(), octree)?;

        let node_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("octree_nodes"),
            size: octree.memory_usage() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&node_buffer, 0, octree.as_bytes());

        let info = OctreeInfo::from_octree(octree);
        let info_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("octree_info"),
            size: std::mem::size_of::<OctreeInfo>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&info_buffer, 0, bytemuck::bytes_of(&info));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("octree_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: node_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: info_buffer.as_entire_binding(),
                },
            ],
        });

        log::debug!(
            "Uploaded {} octree nodes ({}KB)",
            info.node_count,
            octree.memory_usage() / 1024
        );

        Ok(Self {
            node_buffer,
            info_buffer,
            bind_group,
            info,
        })
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn info(&self) -> &OctreeInfo {
        &self.info
    }

    pub fn node_count(&self) -> u32 {
        self.info.node_count
    }

    /// Device memory held by the node array
    pub fn memory_usage(&self) -> u64 {
        self.node_buffer.size()
    }
}

impl Drop for OctreeBuffer {
    fn drop(&mut self) {
        log::debug!("Releasing octree buffer ({} nodes)", self.info.node_count);
    }
}
