//! wgpu implementation of [`RenderBackend`]

use std::sync::Arc;

use super::backend::{Fenced, ReadyToken, RenderBackend, TraceJob};
use super::buffer::octree_buffer::{self, OctreeBuffer};
use super::context::{DeviceLostFlag, GpuContext};
use super::image::CpuImage;
use super::pipeline::path_trace::{PATH_IMAGE_FORMAT, PathTracePipeline, PathTraceResources};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::scene::SceneSnapshot;
use crate::voxel::svo::Octree;

/// Fraction of a voxel a bounce origin is pushed off the surface
const SURFACE_OFFSET: f32 = 1e-2;

/// Resolved path-trace image living on the device
pub struct GpuImage {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl GpuImage {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("path_trace_image"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: PATH_IMAGE_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

struct Shared {
    device: wgpu::Device,
    queue: wgpu::Queue,
    octree_layout: wgpu::BindGroupLayout,
    path_trace: PathTracePipeline,
    device_lost: DeviceLostFlag,
}

impl Shared {
    fn check_device(&self) -> Result<()> {
        if self.device_lost.is_lost() {
            return Err(Error::DeviceLost("device reported lost".into()));
        }
        Ok(())
    }

    /// Submit and return a token that fires once the device has executed the work
    fn submit_fenced(&self, commands: Option<wgpu::CommandBuffer>) -> ReadyToken {
        self.queue.submit(commands);
        let (token, signal) = ReadyToken::pending();
        self.queue.on_submitted_work_done(move || signal.signal());
        token
    }

    /// Block until `index` completes. Only used from worker threads.
    fn wait(&self, index: wgpu::SubmissionIndex) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: None,
            })
            .map(|_| ())
            .map_err(|e| {
                if self.device_lost.is_lost() {
                    Error::DeviceLost(e.to_string())
                } else {
                    Error::DeviceResource(e.to_string())
                }
            })
    }
}

/// GPU backend sharing one device between the render loop and the workers
#[derive(Clone)]
pub struct WgpuBackend {
    shared: Arc<Shared>,
}

impl WgpuBackend {
    pub fn new(context: &GpuContext) -> Self {
        let device = context.device.clone();
        let octree_layout = octree_buffer::create_bind_group_layout(&device);
        let path_trace = PathTracePipeline::new(&device, &octree_layout);
        Self {
            shared: Arc::new(Shared {
                queue: context.queue.clone(),
                device,
                octree_layout,
                path_trace,
                device_lost: context.device_lost.clone(),
            }),
        }
    }

    /// Layout of bind group 1 in the tracing shaders
    pub fn octree_layout(&self) -> &wgpu::BindGroupLayout {
        &self.shared.octree_layout
    }
}

impl RenderBackend for WgpuBackend {
    type Octree = OctreeBuffer;
    type Image = GpuImage;
    type Job = WgpuTraceJob;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn upload_octree(&self, octree: &Arc<Octree>) -> Result<Fenced<OctreeBuffer>> {
        self.shared.check_device()?;
        let buffer = OctreeBuffer::upload(
            &self.shared.device,
            &self.shared.queue,
            &self.shared.octree_layout,
            octree,
        )?;
        // the queued writes ride on this submit
        let token = self.shared.submit_fenced(None);
        Ok(Fenced::new(buffer, token))
    }

    fn begin_path_trace(&self, snapshot: &SceneSnapshot, octree: Arc<OctreeBuffer>) -> Result<WgpuTraceJob> {
        self.shared.check_device()?;
        let resources = self.shared.path_trace.create_resources(
            &self.shared.device,
            &self.shared.queue,
            snapshot,
            SURFACE_OFFSET,
        )?;
        Ok(WgpuTraceJob {
            shared: self.shared.clone(),
            snapshot: snapshot.clone(),
            octree,
            resources,
            samples: 0,
        })
    }

    fn maintain(&self) {
        if let Err(e) = self.shared.device.poll(wgpu::PollType::Poll) {
            log::debug!("device poll: {}", e);
        }
    }

    fn check_device(&self) -> Result<()> {
        self.shared.check_device()
    }
}

/// Path trace accumulating in a device buffer
pub struct WgpuTraceJob {
    shared: Arc<Shared>,
    snapshot: SceneSnapshot,
    octree: Arc<OctreeBuffer>,
    resources: PathTraceResources,
    samples: u32,
}

impl TraceJob for WgpuTraceJob {
    type Image = GpuImage;

    fn snapshot(&self) -> &SceneSnapshot {
        &self.snapshot
    }

    fn samples_done(&self) -> u32 {
        self.samples
    }

    fn trace_batch(&mut self, samples: u32) -> Result<()> {
        self.shared.check_device()?;
        let params = &mut self.resources.params;
        params.sample_start = self.samples;
        params.sample_count = samples;
        params.total_samples = self.samples + samples;
        self.resources.write_params(&self.shared.queue);

        let mut encoder = self
            .shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("path_trace_batch"),
            });
        self.shared
            .path_trace
            .dispatch_trace(&mut encoder, &self.resources, &self.octree);
        let index = self.shared.queue.submit(Some(encoder.finish()));
        self.shared.wait(index)?;
        self.samples += samples;
        Ok(())
    }

    fn resolve(&mut self, recycled: Option<GpuImage>) -> Result<Fenced<GpuImage>> {
        self.shared.check_device()?;
        let (width, height) = (self.snapshot.width, self.snapshot.height);
        let image = match recycled {
            Some(image) if image.width == width && image.height == height => image,
            _ => GpuImage::new(&self.shared.device, width, height),
        };

        self.resources.params.total_samples = self.samples;
        self.resources.write_params(&self.shared.queue);
        let output = self
            .shared
            .path_trace
            .create_output_bind_group(&self.shared.device, image.view());

        let mut encoder = self
            .shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("path_trace_resolve"),
            });
        self.shared
            .path_trace
            .dispatch_resolve(&mut encoder, &self.resources, &self.octree, &output);
        let token = self.shared.submit_fenced(Some(encoder.finish()));
        Ok(Fenced::new(image, token))
    }

    fn read_back(&mut self) -> Result<CpuImage> {
        self.shared.check_device()?;
        let accum = self.resources.accum_buffer();
        let size = accum.size();
        let staging = self.shared.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("path_trace_readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("path_trace_readback"),
            });
        encoder.copy_buffer_to_buffer(accum, 0, &staging, 0, size);
        let index = self.shared.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.shared.wait(index)?;
        rx.recv()
            .map_err(|_| Error::DeviceResource("readback callback dropped".into()))?
            .map_err(|e| Error::DeviceResource(format!("readback map failed: {e}")))?;

        let sums: Vec<[f32; 4]> = {
            let data = slice.get_mapped_range();
            bytemuck::pod_collect_to_vec(&data)
        };
        staging.unmap();

        let scale = 1.0 / self.samples.max(1) as f32;
        let pixels = sums
            .into_iter()
            .map(|[r, g, b, _]| [r * scale, g * scale, b * scale, 1.0])
            .collect();
        CpuImage::from_pixels(self.snapshot.width, self.snapshot.height, pixels)
    }
}
