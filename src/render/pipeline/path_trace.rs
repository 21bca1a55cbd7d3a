//! Progressive path tracing compute pipelines (trace + resolve)

use bytemuck::{Pod, Zeroable};

use super::{buffer_entry, storage_texture_entry, tracing_shader, workgroups};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::buffer::{GpuMaterial, OctreeBuffer};
use crate::scene::SceneSnapshot;

/// Format of resolved path-trace images
pub const PATH_IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Path tracer uniform (144 bytes, matches `PathParams` in path_trace.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PathParams {
    pub view_proj_inv: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub width: u32,
    pub sun_direction: [f32; 3],
    pub height: u32,
    pub sun_radiance: [f32; 3],
    pub sample_start: u32,
    pub sky_color: [f32; 3],
    pub sample_count: u32,
    pub max_bounces: u32,
    pub total_samples: u32,
    /// Bounce origin offset as a fraction of the voxel size
    pub surface_offset: f32,
    pub _pad: u32,
}

impl PathParams {
    pub fn new(snapshot: &SceneSnapshot, surface_offset: f32) -> Self {
        let lighting = &snapshot.lighting;
        Self {
            view_proj_inv: snapshot.camera.view_proj_inverse.to_cols_array_2d(),
            camera_position: snapshot.camera.position.to_array(),
            width: snapshot.width,
            sun_direction: lighting.sun_direction().to_array(),
            height: snapshot.height,
            sun_radiance: lighting.sun_radiance().to_array(),
            sample_start: 0,
            sky_color: lighting.sky_color,
            sample_count: 0,
            max_bounces: snapshot.max_bounces,
            total_samples: 0,
            surface_offset,
            _pad: 0,
        }
    }
}

/// Per-job device state: uniforms, material table and the accumulation buffer
pub struct PathTraceResources {
    pub params: PathParams,
    params_buffer: wgpu::Buffer,
    accum_buffer: wgpu::Buffer,
    params_bind_group: wgpu::BindGroup,
    accum_bind_group: wgpu::BindGroup,
}

impl PathTraceResources {
    pub fn write_params(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&self.params));
    }

    pub fn accum_buffer(&self) -> &wgpu::Buffer {
        &self.accum_buffer
    }
}

/// Shared pipelines; per-job state lives in [`PathTraceResources`]
pub struct PathTracePipeline {
    trace_pipeline: wgpu::ComputePipeline,
    resolve_pipeline: wgpu::ComputePipeline,
    params_layout: wgpu::BindGroupLayout,
    accum_layout: wgpu::BindGroupLayout,
    output_layout: wgpu::BindGroupLayout,
}

impl PathTracePipeline {
    pub fn new(device: &wgpu::Device, octree_layout: &wgpu::BindGroupLayout) -> Self {
        let shader = tracing_shader(
            device,
            "path_trace_shader",
            include_str!("../../../shaders/path_trace.wgsl"),
        );

        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("path_params_layout"),
            entries: &[
                buffer_entry(0, wgpu::BufferBindingType::Uniform),
                buffer_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
            ],
        });
        let accum_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("path_accum_layout"),
            entries: &[buffer_entry(0, wgpu::BufferBindingType::Storage { read_only: false })],
        });
        let output_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("path_output_layout"),
            entries: &[storage_texture_entry(PATH_IMAGE_FORMAT)],
        });

        let trace_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("path_trace_pipeline_layout"),
            bind_group_layouts: &[&params_layout, octree_layout, &accum_layout],
            immediate_size: 0,
        });
        let resolve_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("path_resolve_pipeline_layout"),
            bind_group_layouts: &[&params_layout, octree_layout, &accum_layout, &output_layout],
            immediate_size: 0,
        });

        let trace_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("path_trace_pipeline"),
            layout: Some(&trace_layout),
            module: &shader,
            entry_point: Some("trace"),
            compilation_options: Default::default(),
            cache: None,
        });
        let resolve_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("path_resolve_pipeline"),
            layout: Some(&resolve_layout),
            module: &shader,
            entry_point: Some("resolve"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            trace_pipeline,
            resolve_pipeline,
            params_layout,
            accum_layout,
            output_layout,
        }
    }

    /// Allocate the buffers for one job, failing with `DeviceResource` past device limits
    pub fn create_resources(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        snapshot: &SceneSnapshot,
        surface_offset: f32,
    ) -> Result<PathTraceResources> {
        let accum_size = snapshot.pixel_count() as u64 * 16;
        let limits = device.limits();
        let binding_limit = limits.max_storage_buffer_binding_size as u64;
        if accum_size > binding_limit || accum_size > limits.max_buffer_size {
            return Err(Error::DeviceResource(format!(
                "{}x{} accumulation buffer exceeds device limits",
                snapshot.width, snapshot.height
            )));
        }

        let params = PathParams::new(snapshot, surface_offset);
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("path_params"),
            size: std::mem::size_of::<PathParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut materials: Vec<GpuMaterial> = snapshot.materials.iter().map(GpuMaterial::from).collect();
        if materials.is_empty() {
            materials.push(GpuMaterial::default());
        }
        let material_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("path_materials"),
            size: (materials.len() * std::mem::size_of::<GpuMaterial>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&material_buffer, 0, bytemuck::cast_slice(&materials));

        // zero-initialised on creation
        let accum_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("path_accum"),
            size: accum_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("path_params_bind_group"),
            layout: &self.params_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: material_buffer.as_entire_binding(),
                },
            ],
        });
        let accum_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("path_accum_bind_group"),
            layout: &self.accum_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: accum_buffer.as_entire_binding(),
            }],
        });

        Ok(PathTraceResources {
            params,
            params_buffer,
            accum_buffer,
            params_bind_group,
            accum_bind_group,
        })
    }

    pub fn create_output_bind_group(&self, device: &wgpu::Device, view: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("path_output_bind_group"),
            layout: &self.output_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            }],
        })
    }

    /// Accumulate `resources.params.sample_count` samples per pixel
    pub fn dispatch_trace(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        resources: &PathTraceResources,
        octree: &OctreeBuffer,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("path_trace_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.trace_pipeline);
        pass.set_bind_group(0, &resources.params_bind_group, &[]);
        pass.set_bind_group(1, octree.bind_group(), &[]);
        pass.set_bind_group(2, &resources.accum_bind_group, &[]);
        let (x, y) = workgroups(resources.params.width, resources.params.height);
        pass.dispatch_workgroups(x, y, 1);
    }

    /// Write the running average into the image behind `output`
    pub fn dispatch_resolve(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        resources: &PathTraceResources,
        octree: &OctreeBuffer,
        output: &wgpu::BindGroup,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("path_resolve_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.resolve_pipeline);
        pass.set_bind_group(0, &resources.params_bind_group, &[]);
        pass.set_bind_group(1, octree.bind_group(), &[]);
        pass.set_bind_group(2, &resources.accum_bind_group, &[]);
        pass.set_bind_group(3, output, &[]);
        let (x, y) = workgroups(resources.params.width, resources.params.height);
        pass.dispatch_workgroups(x, y, 1);
    }
}
