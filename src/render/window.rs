//! Swapchain renderer for the interactive viewer

use std::sync::Arc;

use winit::window::Window;

use super::buffer::OctreeBuffer;
use super::context::GpuContext;
use super::frame::FrameSink;
use super::gpu_backend::{GpuImage, WgpuBackend};
use super::pipeline::display::DisplayPipeline;
use super::pipeline::octree_trace::{OctreeTracePipeline, TRACE_TARGET_FORMAT};
use crate::core::camera::Camera;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::scene::SceneSettings;
use crate::worker::LoadStage;

/// Offscreen target the interactive tracer writes into
struct TraceTarget {
    _texture: wgpu::Texture,
    trace_bind_group: wgpu::BindGroup,
    display_bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

impl TraceTarget {
    fn new(
        device: &wgpu::Device,
        trace: &OctreeTracePipeline,
        display: &DisplayPipeline,
        width: u32,
        height: u32,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("trace_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TRACE_TARGET_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            trace_bind_group: trace.create_output_bind_group(device, &view),
            display_bind_group: display.create_bind_group(device, &view),
            _texture: texture,
            width,
            height,
        }
    }
}

/// Surface frame acquired for the current redraw
struct AcquiredFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

/// Draws session frames to the window surface
pub struct WindowRenderer {
    context: GpuContext,
    window: Arc<Window>,
    trace: OctreeTracePipeline,
    display: DisplayPipeline,
    target: TraceTarget,
    frame: Option<AcquiredFrame>,
}

impl WindowRenderer {
    pub fn new(context: GpuContext, window: Arc<Window>, backend: &WgpuBackend) -> Self {
        let trace = OctreeTracePipeline::new(&context.device, backend.octree_layout());
        let display = DisplayPipeline::new(&context.device, context.format());
        let (width, height) = context.size();
        let target = TraceTarget::new(&context.device, &trace, &display, width, height);
        Self {
            context,
            window,
            trace,
            display,
            target,
            frame: None,
        }
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn size(&self) -> (u32, u32) {
        self.context.size()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.frame = None;
        self.context.resize(width, height);
        self.target = TraceTarget::new(&self.context.device, &self.trace, &self.display, width, height);
        log::debug!("Resized to {}x{}", width, height);
    }

    fn clear(&mut self, color: wgpu::Color) -> Result<()> {
        if let Some(frame) = acquire(&mut self.frame, &self.context)? {
            self.display.clear(&mut frame.encoder, &frame.view, color);
        }
        Ok(())
    }
}

/// Acquire the surface texture for this frame once. `Ok(None)` skips the frame.
fn acquire<'a>(slot: &'a mut Option<AcquiredFrame>, context: &GpuContext) -> Result<Option<&'a mut AcquiredFrame>> {
    if slot.is_none() {
        let texture = match context.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                log::debug!("Surface stale, reconfiguring");
                context.reconfigure();
                return Ok(None);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface acquire timed out");
                return Ok(None);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(Error::DeviceLost("out of memory acquiring surface".into()));
            }
            Err(e) => {
                log::warn!("Surface error: {:?}", e);
                return Ok(None);
            }
        };
        let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        *slot = Some(AcquiredFrame {
            texture,
            view,
            encoder,
        });
    }
    Ok(slot.as_mut())
}

fn loading_color(stage: LoadStage) -> wgpu::Color {
    let level = match stage {
        LoadStage::Idle => 0.05,
        LoadStage::Parsing => 0.10,
        LoadStage::Voxelizing => 0.15,
        LoadStage::Uploading => 0.20,
    };
    wgpu::Color {
        r: level,
        g: level,
        b: level * 1.5,
        a: 1.0,
    }
}

impl FrameSink<WgpuBackend> for WindowRenderer {
    fn draw_empty(&mut self) -> Result<()> {
        self.clear(wgpu::Color {
            r: 0.02,
            g: 0.02,
            b: 0.03,
            a: 1.0,
        })
    }

    fn draw_loading(&mut self, stage: LoadStage) -> Result<()> {
        self.clear(loading_color(stage))
    }

    fn draw_octree(&mut self, octree: &OctreeBuffer, camera: &Camera, settings: &SceneSettings) -> Result<()> {
        let (width, height) = (self.target.width, self.target.height);
        self.trace
            .update(&self.context.queue, camera, settings, width, height);

        if let Some(frame) = acquire(&mut self.frame, &self.context)? {
            self.trace
                .dispatch(&mut frame.encoder, octree, &self.target.trace_bind_group, width, height);
            self.display
                .render(&mut frame.encoder, &frame.view, &self.target.display_bind_group);
        }
        Ok(())
    }

    fn draw_image(&mut self, image: &GpuImage) -> Result<()> {
        let bind_group = self.display.create_bind_group(&self.context.device, image.view());
        if let Some(frame) = acquire(&mut self.frame, &self.context)? {
            self.display.render(&mut frame.encoder, &frame.view, &bind_group);
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        self.context.queue.submit(Some(frame.encoder.finish()));
        self.window.pre_present_notify();
        frame.texture.present();
        Ok(())
    }
}
