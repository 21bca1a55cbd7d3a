//! Render pipelines

pub mod octree_trace;
pub mod path_trace;
pub mod display;

pub use octree_trace::{OctreeTracePipeline, TraceParams};
pub use path_trace::{PathParams, PathTracePipeline, PathTraceResources};
pub use display::DisplayPipeline;

/// Traversal and sampling functions shared by the tracing shaders
const COMMON_WGSL: &str = include_str!("../../../shaders/common.wgsl");

/// Compile a tracing shader with the shared prelude prepended
pub(crate) fn tracing_shader(device: &wgpu::Device, label: &str, body: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(format!("{COMMON_WGSL}\n{body}").into()),
    })
}

pub(crate) fn storage_texture_entry(format: wgpu::TextureFormat) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

pub(crate) fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// 8x8 workgroups covering a width x height image
pub(crate) fn workgroups(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(8), height.div_ceil(8))
}
