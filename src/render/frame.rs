//! Per-frame drawing surface driven by the session controller

use std::sync::Arc;

use super::backend::RenderBackend;
use super::cpu::CpuBackend;
use super::image::CpuImage;
use crate::core::camera::Camera;
use crate::core::types::Result;
use crate::scene::{SceneSettings, SceneSnapshot};
use crate::voxel::svo::Octree;
use crate::worker::LoadStage;

/// Where a frame ends up. The controller calls exactly one `draw_*` per
/// frame, then [`FrameSink::present`].
pub trait FrameSink<B: RenderBackend> {
    fn draw_empty(&mut self) -> Result<()>;

    fn draw_loading(&mut self, stage: LoadStage) -> Result<()>;

    /// Interactive raymarch of the live octree
    fn draw_octree(&mut self, octree: &B::Octree, camera: &Camera, settings: &SceneSettings) -> Result<()>;

    /// Latest path tracer image
    fn draw_image(&mut self, image: &B::Image) -> Result<()>;

    fn present(&mut self) -> Result<()>;
}

/// What a headless frame showed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawKind {
    Empty,
    Loading(LoadStage),
    Octree,
    Image,
}

/// Frames a [`HeadlessSink`] remembers
pub const FRAME_HISTORY: usize = 256;

/// Sink that only records what was drawn. Keeps the most recent
/// [`FRAME_HISTORY`] frames and a count of everything presented.
#[derive(Debug, Default)]
pub struct HeadlessSink {
    frames: Vec<DrawKind>,
    last: Option<DrawKind>,
    presented: u64,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recent presented frames, oldest first
    pub fn frames(&self) -> &[DrawKind] {
        &self.frames
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn last_frame(&self) -> Option<DrawKind> {
        self.frames.last().copied()
    }

    fn record(&mut self, kind: DrawKind) -> Result<()> {
        self.last = Some(kind);
        Ok(())
    }
}

impl<B: RenderBackend> FrameSink<B> for HeadlessSink {
    fn draw_empty(&mut self) -> Result<()> {
        self.record(DrawKind::Empty)
    }

    fn draw_loading(&mut self, stage: LoadStage) -> Result<()> {
        self.record(DrawKind::Loading(stage))
    }

    fn draw_octree(&mut self, _octree: &B::Octree, _camera: &Camera, _settings: &SceneSettings) -> Result<()> {
        self.record(DrawKind::Octree)
    }

    fn draw_image(&mut self, _image: &B::Image) -> Result<()> {
        self.record(DrawKind::Image)
    }

    fn present(&mut self) -> Result<()> {
        if let Some(kind) = self.last.take() {
            self.frames.push(kind);
            self.presented += 1;
            if self.frames.len() > FRAME_HISTORY {
                let excess = self.frames.len() - FRAME_HISTORY;
                self.frames.drain(..excess);
            }
        }
        Ok(())
    }
}

/// Headless sink for the CPU backend that also shades octree frames
pub struct PreviewSink {
    frames: HeadlessSink,
    width: u32,
    height: u32,
    preview: Option<CpuImage>,
}

impl PreviewSink {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frames: HeadlessSink::new(),
            width,
            height,
            preview: None,
        }
    }

    pub fn frames(&self) -> &[DrawKind] {
        self.frames.frames()
    }

    /// Most recent octree or path tracer frame
    pub fn preview(&self) -> Option<&CpuImage> {
        self.preview.as_ref()
    }
}

impl FrameSink<CpuBackend> for PreviewSink {
    fn draw_empty(&mut self) -> Result<()> {
        FrameSink::<CpuBackend>::draw_empty(&mut self.frames)
    }

    fn draw_loading(&mut self, stage: LoadStage) -> Result<()> {
        FrameSink::<CpuBackend>::draw_loading(&mut self.frames, stage)
    }

    fn draw_octree(&mut self, octree: &Arc<Octree>, camera: &Camera, settings: &SceneSettings) -> Result<()> {
        let snapshot = SceneSnapshot::capture(settings, camera, self.width, self.height);
        self.preview = Some(CpuBackend::new().render_preview(octree, &snapshot)?);
        FrameSink::<CpuBackend>::draw_octree(&mut self.frames, octree, camera, settings)
    }

    fn draw_image(&mut self, image: &CpuImage) -> Result<()> {
        self.preview = Some(image.clone());
        FrameSink::<CpuBackend>::draw_image(&mut self.frames, image)
    }

    fn present(&mut self) -> Result<()> {
        FrameSink::<CpuBackend>::present(&mut self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_presented_frames_are_recorded() {
        let mut sink = HeadlessSink::new();
        FrameSink::<CpuBackend>::draw_empty(&mut sink).unwrap();
        assert!(sink.frames().is_empty());
        FrameSink::<CpuBackend>::present(&mut sink).unwrap();
        FrameSink::<CpuBackend>::draw_loading(&mut sink, LoadStage::Parsing).unwrap();
        FrameSink::<CpuBackend>::present(&mut sink).unwrap();
        // present without a draw adds nothing
        FrameSink::<CpuBackend>::present(&mut sink).unwrap();

        assert_eq!(sink.frames(), &[DrawKind::Empty, DrawKind::Loading(LoadStage::Parsing)]);
        assert_eq!(sink.last_frame(), Some(DrawKind::Loading(LoadStage::Parsing)));
        assert_eq!(sink.presented(), 2);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut sink = HeadlessSink::new();
        FrameSink::<CpuBackend>::draw_loading(&mut sink, LoadStage::Parsing).unwrap();
        FrameSink::<CpuBackend>::present(&mut sink).unwrap();
        for _ in 0..FRAME_HISTORY * 3 {
            FrameSink::<CpuBackend>::draw_empty(&mut sink).unwrap();
            FrameSink::<CpuBackend>::present(&mut sink).unwrap();
        }
        assert_eq!(sink.frames().len(), FRAME_HISTORY);
        assert!(sink.frames().iter().all(|&kind| kind == DrawKind::Empty));
        assert_eq!(sink.presented(), FRAME_HISTORY as u64 * 3 + 1);
    }
}
