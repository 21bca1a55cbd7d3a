//! Seam between the session logic and whatever executes GPU work.
//!
//! Everything that crosses a thread boundary on its way to the screen travels as
//! a [`Fenced`] value: the payload plus a [`ReadyToken`] that flips once the
//! device has finished writing it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::types::Result;
use crate::render::image::CpuImage;
use crate::scene::SceneSnapshot;
use crate::voxel::svo::Octree;

/// Read side of a one-shot completion flag
#[derive(Clone, Debug)]
pub struct ReadyToken(Arc<AtomicBool>);

/// Write side; consumed when signalled
#[derive(Debug)]
pub struct ReadySignal(Arc<AtomicBool>);

impl ReadyToken {
    /// Token for data that is usable immediately
    pub fn signaled() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn pending() -> (Self, ReadySignal) {
        let flag = Arc::new(AtomicBool::new(false));
        (Self(flag.clone()), ReadySignal(flag))
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl ReadySignal {
    pub fn signal(self) {
        self.0.store(true, Ordering::Release);
    }
}

/// A payload that may only be used once its token is ready
#[derive(Debug)]
pub struct Fenced<T> {
    payload: T,
    token: ReadyToken,
}

impl<T> Fenced<T> {
    pub fn new(payload: T, token: ReadyToken) -> Self {
        Self { payload, token }
    }

    /// Wrap data that needs no device work
    pub fn ready(payload: T) -> Self {
        Self::new(payload, ReadyToken::signaled())
    }

    pub fn is_ready(&self) -> bool {
        self.token.is_ready()
    }

    /// Unwrap the payload, or give the value back while the device is still writing it
    pub fn try_into_ready(self) -> std::result::Result<T, Self> {
        if self.is_ready() { Ok(self.payload) } else { Err(self) }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fenced<U> {
        Fenced {
            payload: f(self.payload),
            token: self.token,
        }
    }
}

/// Device that can hold octrees and run path-trace jobs
pub trait RenderBackend: Send + Sync + 'static {
    /// Device-resident copy of an octree
    type Octree: Send + Sync + 'static;
    /// Displayable progressive image
    type Image: Send + 'static;
    type Job: TraceJob<Image = Self::Image>;

    fn name(&self) -> &'static str;

    /// Copy an octree into device memory; the token fires when the copy has landed
    fn upload_octree(&self, octree: &Arc<Octree>) -> Result<Fenced<Self::Octree>>;

    /// Allocate the accumulation state for a path trace of `snapshot`
    fn begin_path_trace(
        &self,
        snapshot: &SceneSnapshot,
        octree: Arc<Self::Octree>,
    ) -> Result<Self::Job>;

    /// Run completion callbacks without blocking
    fn maintain(&self);

    /// `Err(Error::DeviceLost)` once the device is gone
    fn check_device(&self) -> Result<()>;
}

/// One running path trace, driven from the path tracer thread
pub trait TraceJob: Send + 'static {
    type Image: Send + 'static;

    fn snapshot(&self) -> &SceneSnapshot;

    /// Samples per pixel accumulated so far
    fn samples_done(&self) -> u32;

    /// Accumulate `samples` more samples per pixel, blocking until they finish
    fn trace_batch(&mut self, samples: u32) -> Result<()>;

    /// Write the current average into an image, reusing `recycled` when its size fits
    fn resolve(&mut self, recycled: Option<Self::Image>) -> Result<Fenced<Self::Image>>;

    /// Copy the current average to host memory
    fn read_back(&mut self) -> Result<CpuImage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_token() {
        let (token, signal) = ReadyToken::pending();
        let fenced = Fenced::new(7, token.clone());
        assert!(!token.is_ready());

        let fenced = fenced.try_into_ready().unwrap_err();
        signal.signal();
        assert!(token.is_ready());
        assert_eq!(fenced.try_into_ready().ok(), Some(7));
    }

    #[test]
    fn test_signal_from_other_thread() {
        let (token, signal) = ReadyToken::pending();
        std::thread::spawn(move || signal.signal()).join().unwrap();
        assert!(token.is_ready());
    }

    #[test]
    fn test_map_keeps_token() {
        let (token, signal) = ReadyToken::pending();
        let fenced = Fenced::new(2, token).map(|v| v * 10);
        assert!(!fenced.is_ready());
        signal.signal();
        assert_eq!(fenced.try_into_ready().ok(), Some(20));
    }
}
