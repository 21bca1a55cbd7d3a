//! Test-only backend whose uploads and batches are released by the test

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use glam::Vec3;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::Triangle;
use crate::render::backend::{Fenced, ReadySignal, ReadyToken, RenderBackend, TraceJob};
use crate::render::cpu::{CpuBackend, CpuTraceJob};
use crate::render::image::CpuImage;
use crate::scene::SceneSnapshot;
use crate::voxel::svo::{Octree, OctreeBuilder};

/// Poll `condition` until it holds or `timeout` passes
pub(crate) fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Unit cube with one red material
pub(crate) fn write_cube_obj(dir: &Path) -> PathBuf {
    let mtl = "newmtl red\nKd 0.9 0.1 0.1\n";
    let obj = "mtllib cube.mtl\n\
        v -0.5 -0.5 -0.5\nv 0.5 -0.5 -0.5\nv 0.5 0.5 -0.5\nv -0.5 0.5 -0.5\n\
        v -0.5 -0.5 0.5\nv 0.5 -0.5 0.5\nv 0.5 0.5 0.5\nv -0.5 0.5 0.5\n\
        usemtl red\n\
        f 1 4 3 2\nf 5 6 7 8\nf 1 2 6 5\nf 4 8 7 3\nf 1 5 8 4\nf 2 3 7 6\n";
    std::fs::write(dir.join("cube.mtl"), mtl).unwrap();
    let path = dir.join("cube.obj");
    std::fs::write(&path, obj).unwrap();
    path
}

/// Flat 2x2 floor at y = 0
pub(crate) fn floor_octree() -> Octree {
    let a = Vec3::new(-1.0, 0.0, -1.0);
    let b = Vec3::new(1.0, 0.0, -1.0);
    let c = Vec3::new(1.0, 0.0, 1.0);
    let d = Vec3::new(-1.0, 0.0, 1.0);
    let triangles = [Triangle::new([a, c, b], 0), Triangle::new([a, d, c], 0)];
    OctreeBuilder::new(4).unwrap().build(&triangles).unwrap()
}

#[derive(Default)]
struct GateState {
    uploads_open: bool,
    hold_tokens: bool,
    held: Vec<ReadySignal>,
    /// Batches allowed to run; `u32::MAX` means unlimited
    permits: u32,
}

#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
    uploads_started: AtomicUsize,
    batches: AtomicU32,
    recycled: AtomicUsize,
    live_jobs: AtomicUsize,
    fail: AtomicBool,
    lost: AtomicBool,
}

impl Gate {
    fn update(&self, f: impl FnOnce(&mut GateState)) {
        f(&mut self.state.lock().unwrap());
        self.changed.notify_all();
    }

    fn device_error(&self) -> Result<()> {
        if self.lost.load(Ordering::Acquire) {
            return Err(Error::DeviceLost("test device lost".into()));
        }
        Ok(())
    }
}

/// Test side of a [`GatedBackend`]
#[derive(Clone)]
pub(crate) struct GateHandle(Arc<Gate>);

impl GateHandle {
    pub fn open_uploads(&self) {
        self.0.update(|s| s.uploads_open = true);
    }

    /// Uploads return pending tokens until [`Self::signal_upload_tokens`]
    pub fn hold_upload_tokens(&self) {
        self.0.update(|s| s.hold_tokens = true);
    }

    pub fn signal_upload_tokens(&self) {
        self.0.update(|s| {
            s.hold_tokens = false;
            for signal in s.held.drain(..) {
                signal.signal();
            }
        });
    }

    pub fn uploads_started(&self) -> usize {
        self.0.uploads_started.load(Ordering::Acquire)
    }

    pub fn allow_batches(&self, count: u32) {
        self.0.update(|s| s.permits = s.permits.saturating_add(count));
    }

    pub fn batches_traced(&self) -> u32 {
        self.0.batches.load(Ordering::Acquire)
    }

    pub fn recycled_resolves(&self) -> usize {
        self.0.recycled.load(Ordering::Acquire)
    }

    /// Jobs created and not yet dropped
    pub fn live_jobs(&self) -> usize {
        self.0.live_jobs.load(Ordering::Acquire)
    }

    pub fn fail_batches(&self) {
        self.0.fail.store(true, Ordering::Release);
    }

    pub fn lose_device(&self) {
        self.0.lost.store(true, Ordering::Release);
        self.0.update(|_| {});
    }

    /// Unblock everything so workers can wind down
    pub fn release_all(&self) {
        self.allow_batches(u32::MAX);
        self.open_uploads();
        self.signal_upload_tokens();
    }
}

/// CPU backend whose progress is driven by a [`GateHandle`]
#[derive(Clone)]
pub(crate) struct GatedBackend {
    cpu: CpuBackend,
    gate: Arc<Gate>,
}

impl GatedBackend {
    pub fn new() -> (Self, GateHandle) {
        let gate = Arc::new(Gate::default());
        (
            Self {
                cpu: CpuBackend::new(),
                gate: gate.clone(),
            },
            GateHandle(gate),
        )
    }
}

impl RenderBackend for GatedBackend {
    type Octree = Arc<Octree>;
    type Image = CpuImage;
    type Job = GatedJob;

    fn name(&self) -> &'static str {
        "gated"
    }

    fn upload_octree(&self, octree: &Arc<Octree>) -> Result<Fenced<Arc<Octree>>> {
        self.gate.uploads_started.fetch_add(1, Ordering::AcqRel);
        let mut state = self.gate.state.lock().unwrap();
        while !state.uploads_open && !self.gate.lost.load(Ordering::Acquire) {
            state = self.gate.changed.wait(state).unwrap();
        }
        self.gate.device_error()?;
        if state.hold_tokens {
            let (token, signal) = ReadyToken::pending();
            state.held.push(signal);
            return Ok(Fenced::new(octree.clone(), token));
        }
        Ok(Fenced::ready(octree.clone()))
    }

    fn begin_path_trace(&self, snapshot: &SceneSnapshot, octree: Arc<Arc<Octree>>) -> Result<GatedJob> {
        self.gate.device_error()?;
        let inner = self.cpu.begin_path_trace(snapshot, octree)?;
        self.gate.live_jobs.fetch_add(1, Ordering::AcqRel);
        Ok(GatedJob {
            inner,
            gate: self.gate.clone(),
        })
    }

    fn maintain(&self) {}

    fn check_device(&self) -> Result<()> {
        self.gate.device_error()
    }
}

pub(crate) struct GatedJob {
    inner: CpuTraceJob,
    gate: Arc<Gate>,
}

impl TraceJob for GatedJob {
    type Image = CpuImage;

    fn snapshot(&self) -> &SceneSnapshot {
        self.inner.snapshot()
    }

    fn samples_done(&self) -> u32 {
        self.inner.samples_done()
    }

    fn trace_batch(&mut self, samples: u32) -> Result<()> {
        {
            let mut state = self.gate.state.lock().unwrap();
            while state.permits == 0 && !self.gate.lost.load(Ordering::Acquire) {
                state = self.gate.changed.wait(state).unwrap();
            }
            if state.permits != u32::MAX && state.permits > 0 {
                state.permits -= 1;
            }
        }
        self.gate.device_error()?;
        if self.gate.fail.load(Ordering::Acquire) {
            return Err(Error::DeviceResource("test allocation failure".into()));
        }
        self.inner.trace_batch(samples)?;
        self.gate.batches.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn resolve(&mut self, recycled: Option<CpuImage>) -> Result<Fenced<CpuImage>> {
        if recycled.is_some() {
            self.gate.recycled.fetch_add(1, Ordering::AcqRel);
        }
        self.inner.resolve(recycled)
    }

    fn read_back(&mut self) -> Result<CpuImage> {
        self.inner.read_back()
    }
}

impl Drop for GatedJob {
    fn drop(&mut self) {
        self.gate.live_jobs.fetch_sub(1, Ordering::AcqRel);
    }
}
