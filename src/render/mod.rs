//! Rendering backends and GPU interfaces

pub mod backend;
pub mod buffer;
pub mod context;
pub mod cpu;
pub mod frame;
pub mod gpu_backend;
pub mod image;
pub mod pipeline;
pub mod window;

pub use backend::{Fenced, ReadyToken, RenderBackend, TraceJob};
pub use context::GpuContext;
pub use cpu::CpuBackend;
pub use frame::{DrawKind, FrameSink, HeadlessSink, PreviewSink};
pub use gpu_backend::{GpuImage, WgpuBackend};
pub use image::CpuImage;
pub use window::WindowRenderer;
