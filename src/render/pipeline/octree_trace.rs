//! Interactive octree ray tracing compute pipeline

use bytemuck::{Pod, Zeroable};

use super::{buffer_entry, storage_texture_entry, tracing_shader, workgroups};
use crate::core::camera::Camera;
use crate::render::buffer::{CameraBuffer, MaterialBuffer, OctreeBuffer};
use crate::scene::{Lighting, SceneSettings};

/// Format of the interactive trace target
pub const TRACE_TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Trace parameters uniform (48 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TraceParams {
    pub sun_direction: [f32; 3],
    pub width: u32,
    pub sun_radiance: [f32; 3],
    pub height: u32,
    pub sky_color: [f32; 3],
    pub ambient: f32,
}

impl TraceParams {
    pub fn new(lighting: &Lighting, width: u32, height: u32) -> Self {
        Self {
            sun_direction: lighting.sun_direction().to_array(),
            width,
            sun_radiance: lighting.sun_radiance().to_array(),
            height,
            sky_color: lighting.sky_color,
            ambient: lighting.ambient,
        }
    }
}

/// Octree ray tracing compute pipeline
pub struct OctreeTracePipeline {
    pipeline: wgpu::ComputePipeline,
    camera: CameraBuffer,
    params_buffer: wgpu::Buffer,
    materials: MaterialBuffer,
    params_bind_group: wgpu::BindGroup,
    output_bind_group_layout: wgpu::BindGroupLayout,
}

impl OctreeTracePipeline {
    pub fn new(device: &wgpu::Device, octree_layout: &wgpu::BindGroupLayout) -> Self {
        let shader = tracing_shader(
            device,
            "octree_trace_shader",
            include_str!("../../../shaders/octree_trace.wgsl"),
        );

        let camera = CameraBuffer::new(device);
        let materials = MaterialBuffer::new(device);
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("trace_params"),
            size: std::mem::size_of::<TraceParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Bind group 0: camera + params + materials
        let params_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("trace_params_layout"),
            entries: &[
                buffer_entry(0, wgpu::BufferBindingType::Uniform),
                buffer_entry(1, wgpu::BufferBindingType::Uniform),
                buffer_entry(2, wgpu::BufferBindingType::Storage { read_only: true }),
            ],
        });

        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("trace_params_bind_group"),
            layout: &params_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: materials.buffer().as_entire_binding(),
                },
            ],
        });

        // Bind group 2: output color
        let output_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("trace_output_layout"),
            entries: &[storage_texture_entry(TRACE_TARGET_FORMAT)],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("octree_trace_pipeline_layout"),
            bind_group_layouts: &[&params_bind_group_layout, octree_layout, &output_bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("octree_trace_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            pipeline,
            camera,
            params_buffer,
            materials,
            params_bind_group,
            output_bind_group_layout,
        }
    }

    /// Create output bind group for the trace target view
    pub fn create_output_bind_group(&self, device: &wgpu::Device, target: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("trace_output_bind_group"),
            layout: &self.output_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(target),
            }],
        })
    }

    /// Write camera, lighting and materials for the next dispatch
    pub fn update(
        &mut self,
        queue: &wgpu::Queue,
        camera: &Camera,
        settings: &SceneSettings,
        width: u32,
        height: u32,
    ) {
        self.camera.update(queue, camera);
        let params = TraceParams::new(&settings.lighting, width, height);
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
        self.materials.update(queue, &settings.materials);
    }

    /// Dispatch compute shader
    pub fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        octree: &OctreeBuffer,
        output_bind_group: &wgpu::BindGroup,
        width: u32,
        height: u32,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("octree_trace_pass"),
            timestamp_writes: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.params_bind_group, &[]);
        pass.set_bind_group(1, octree.bind_group(), &[]);
        pass.set_bind_group(2, output_bind_group, &[]);

        let (x, y) = workgroups(width, height);
        pass.dispatch_workgroups(x, y, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<TraceParams>(), 48);
        let lighting = Lighting::default();
        let params = TraceParams::new(&lighting, 640, 360);
        assert_eq!((params.width, params.height), (640, 360));
        let sun = glam::Vec3::from(params.sun_direction);
        assert!((sun.length() - 1.0).abs() < 1e-5);
    }
}
