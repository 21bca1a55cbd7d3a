//! Progressive path tracer worker
//!
//! One job at a time. The job traces fixed-size sample batches; after each
//! batch the resolved image is published and the cancel flag is checked, so
//! a stop request takes effect within one batch. Displayed images come back
//! through [`PathTracer::recycle`] and are reused as resolve targets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::time::{Duration, Instant};

use super::handoff::{WorkerThread, gone};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::backend::{Fenced, RenderBackend, TraceJob};
use crate::render::image::CpuImage;
use crate::scene::SceneSnapshot;

const WORKER_NAME: &str = "path-tracer";

/// Read-back image of a finished or cancelled trace
#[derive(Clone, Debug)]
pub struct TraceResult {
    pub image: CpuImage,
    pub samples: u32,
}

/// Message from the worker to the controller
pub enum TraceEvent<I> {
    /// Accumulated image after a batch; displayable once the token is ready
    Progress {
        image: Fenced<I>,
        samples: u32,
        budget: u32,
    },
    Done(TraceResult),
    Cancelled(TraceResult),
    Failed(Error),
}

impl<I> TraceEvent<I> {
    /// Whether this event ends the job
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TraceEvent::Progress { .. })
    }
}

enum TraceCommand<B: RenderBackend> {
    Start {
        snapshot: SceneSnapshot,
        octree: Arc<B::Octree>,
        budget: u32,
        cancel: Arc<AtomicBool>,
    },
    Recycle(B::Image),
    Shutdown,
}

/// Main-thread handle to the path tracer thread
pub struct PathTracer<B: RenderBackend> {
    commands: Sender<TraceCommand<B>>,
    events: Receiver<TraceEvent<B::Image>>,
    /// Cancel flag of the running job
    cancel: Option<Arc<AtomicBool>>,
    disconnected: bool,
    thread: WorkerThread,
}

impl<B: RenderBackend> PathTracer<B> {
    pub fn spawn(backend: B, samples_per_batch: u32) -> Result<Self> {
        let (commands, command_rx) = channel();
        let (event_tx, events) = channel();
        let samples_per_batch = samples_per_batch.max(1);

        let thread = WorkerThread::spawn(WORKER_NAME, move || {
            tracer_loop(backend, samples_per_batch, command_rx, event_tx)
        })?;

        Ok(Self {
            commands,
            events,
            cancel: None,
            disconnected: false,
            thread,
        })
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    /// Begin tracing `budget` samples of `snapshot`
    pub fn start(&mut self, snapshot: SceneSnapshot, octree: Arc<B::Octree>, budget: u32) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        let cancel = Arc::new(AtomicBool::new(false));
        self.commands
            .send(TraceCommand::Start {
                snapshot,
                octree,
                budget: budget.max(1),
                cancel: cancel.clone(),
            })
            .map_err(|_| gone(WORKER_NAME))?;
        self.cancel = Some(cancel);
        Ok(())
    }

    /// Ask the running job to stop after its current batch.
    /// Returns false when nothing is running.
    pub fn stop(&self) -> bool {
        match &self.cancel {
            Some(cancel) => {
                cancel.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Hand a no-longer-displayed image back for reuse
    pub fn recycle(&self, image: B::Image) {
        let _ = self.commands.send(TraceCommand::Recycle(image));
    }

    /// Next event from the worker, if any. Non-blocking.
    pub fn poll(&mut self) -> Option<TraceEvent<B::Image>> {
        match self.events.try_recv() {
            Ok(event) => {
                if event.is_terminal() {
                    self.cancel = None;
                }
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if self.disconnected {
                    return None;
                }
                self.disconnected = true;
                self.cancel = None;
                Some(TraceEvent::Failed(gone(WORKER_NAME)))
            }
        }
    }

    /// Cancel any job and stop the thread, waiting at most `timeout`
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        self.stop();
        let _ = self.commands.send(TraceCommand::Shutdown);
        self.thread.join_timeout(timeout)
    }
}

fn tracer_loop<B: RenderBackend>(
    backend: B,
    samples_per_batch: u32,
    commands: Receiver<TraceCommand<B>>,
    events: Sender<TraceEvent<B::Image>>,
) {
    let mut worker = Worker {
        backend,
        samples_per_batch,
        commands,
        events,
        spare: None,
        shutdown: false,
    };

    while !worker.shutdown {
        let Ok(command) = worker.commands.recv() else {
            break;
        };
        match command {
            TraceCommand::Start {
                snapshot,
                octree,
                budget,
                cancel,
            } => {
                let event = worker.run(&snapshot, octree, budget, &cancel);
                if worker.events.send(event).is_err() {
                    break;
                }
            }
            TraceCommand::Recycle(image) => worker.spare = Some(image),
            TraceCommand::Shutdown => break,
        }
    }
    log::debug!("Path tracer exiting");
}

struct Worker<B: RenderBackend> {
    backend: B,
    samples_per_batch: u32,
    commands: Receiver<TraceCommand<B>>,
    events: Sender<TraceEvent<B::Image>>,
    spare: Option<B::Image>,
    shutdown: bool,
}

impl<B: RenderBackend> Worker<B> {
    fn run(
        &mut self,
        snapshot: &SceneSnapshot,
        octree: Arc<B::Octree>,
        budget: u32,
        cancel: &AtomicBool,
    ) -> TraceEvent<B::Image> {
        log::info!(
            "Path trace started: {}x{}, {} samples, {} bounces ({})",
            snapshot.width,
            snapshot.height,
            budget,
            snapshot.max_bounces,
            self.backend.name()
        );
        let start = Instant::now();

        let mut job = match self.backend.begin_path_trace(snapshot, octree) {
            Ok(job) => job,
            Err(error) => {
                log::error!("Path trace could not start: {}", error);
                return TraceEvent::Failed(error);
            }
        };

        let outcome = self
            .trace(&mut job, budget, cancel)
            .and_then(|cancelled| Ok((cancelled, job.read_back()?)));
        let samples = job.samples_done();
        // device resources go before the terminal event
        drop(job);

        match outcome {
            Ok((cancelled, image)) => {
                let result = TraceResult { image, samples };
                if cancelled {
                    log::info!("Path trace cancelled after {} samples", samples);
                    TraceEvent::Cancelled(result)
                } else {
                    log::info!("Path trace done: {} samples in {:.1?}", samples, start.elapsed());
                    TraceEvent::Done(result)
                }
            }
            Err(error) => {
                log::error!("Path trace failed after {} samples: {}", samples, error);
                TraceEvent::Failed(error)
            }
        }
    }

    /// Trace batches until the budget is spent or cancel is set.
    /// Returns whether the job was cancelled.
    fn trace(&mut self, job: &mut B::Job, budget: u32, cancel: &AtomicBool) -> Result<bool> {
        loop {
            if self.cancelled(cancel) {
                return Ok(true);
            }
            let remaining = budget.saturating_sub(job.samples_done());
            if remaining == 0 {
                return Ok(false);
            }

            self.backend.check_device()?;
            job.trace_batch(remaining.min(self.samples_per_batch))?;

            self.drain_commands(cancel);
            let image = job.resolve(self.spare.take())?;
            let progress = TraceEvent::Progress {
                image,
                samples: job.samples_done(),
                budget,
            };
            if self.events.send(progress).is_err() {
                self.shutdown = true;
                return Ok(true);
            }

            if self.cancelled(cancel) {
                return Ok(true);
            }
        }
    }

    fn cancelled(&self, cancel: &AtomicBool) -> bool {
        self.shutdown || cancel.load(Ordering::Acquire)
    }

    /// Pick up recycled images and shutdown requests that arrived mid-job
    fn drain_commands(&mut self, cancel: &AtomicBool) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                TraceCommand::Recycle(image) => self.spare = Some(image),
                TraceCommand::Shutdown => {
                    self.shutdown = true;
                    cancel.store(true, Ordering::Release);
                }
                TraceCommand::Start { .. } => {
                    log::warn!("Ignoring path trace start while a job is running");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::camera::Camera;
    use crate::render::cpu::CpuBackend;
    use crate::scene::SceneSettings;
    use crate::voxel::svo::Octree;
    use crate::worker::testing::{GatedBackend, floor_octree, wait_for};

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn snapshot() -> SceneSnapshot {
        let camera = Camera::look_at(glam::Vec3::new(0.0, 1.5, 1.0), glam::Vec3::ZERO, glam::Vec3::Y);
        SceneSnapshot::capture(&SceneSettings::default(), &camera, 8, 6)
    }

    fn octree() -> Arc<Arc<Octree>> {
        Arc::new(Arc::new(floor_octree()))
    }

    /// Drain events until a terminal one, counting progress updates
    fn run_to_end<B: RenderBackend>(tracer: &mut PathTracer<B>) -> (usize, TraceEvent<B::Image>) {
        let mut progress = 0;
        let mut terminal = None;
        assert!(wait_for(TIMEOUT, || {
            while let Some(event) = tracer.poll() {
                if event.is_terminal() {
                    terminal = Some(event);
                    return true;
                }
                progress += 1;
            }
            false
        }));
        (progress, terminal.unwrap())
    }

    #[test]
    fn test_trace_to_completion() {
        let mut tracer = PathTracer::spawn(CpuBackend::new(), 2).unwrap();
        tracer.start(snapshot(), octree(), 5).unwrap();
        assert!(tracer.is_running());

        let (progress, event) = run_to_end(&mut tracer);
        // batches of 2, 2 and 1
        assert_eq!(progress, 3);
        match event {
            TraceEvent::Done(result) => {
                assert_eq!(result.samples, 5);
                assert_eq!(result.image.width(), 8);
                assert!(!result.image.is_blank());
            }
            _ => panic!("expected Done"),
        }
        assert!(!tracer.is_running());
        assert!(tracer.shutdown(TIMEOUT));
    }

    #[test]
    fn test_start_while_running_is_rejected() {
        let (backend, gate) = GatedBackend::new();
        let mut tracer = PathTracer::spawn(backend, 1).unwrap();
        tracer.start(snapshot(), octree(), 4).unwrap();
        gate.allow_batches(1);
        assert!(wait_for(TIMEOUT, || gate.batches_traced() == 1));

        assert!(matches!(
            tracer.start(snapshot(), octree(), 4),
            Err(Error::AlreadyRunning)
        ));

        gate.allow_batches(3);
        let (progress, event) = run_to_end(&mut tracer);
        assert_eq!(progress, 4);
        assert!(matches!(event, TraceEvent::Done(ref r) if r.samples == 4));
        assert!(tracer.shutdown(TIMEOUT));
    }

    #[test]
    fn test_stop_cancels_within_one_batch() {
        let (backend, gate) = GatedBackend::new();
        let mut tracer = PathTracer::spawn(backend, 1).unwrap();
        tracer.start(snapshot(), octree(), 64).unwrap();

        gate.allow_batches(10);
        assert!(wait_for(TIMEOUT, || gate.batches_traced() == 10));
        assert!(tracer.stop());
        gate.allow_batches(1);

        let (_, event) = run_to_end(&mut tracer);
        match event {
            TraceEvent::Cancelled(result) => {
                assert!((10..=11).contains(&result.samples), "{} samples", result.samples);
                assert!(!result.image.is_blank());
            }
            _ => panic!("expected Cancelled"),
        }
        assert_eq!(gate.live_jobs(), 0);
        assert!(tracer.shutdown(TIMEOUT));
    }

    #[test]
    fn test_batch_failure_is_reported() {
        let (backend, gate) = GatedBackend::new();
        gate.allow_batches(u32::MAX);
        gate.fail_batches();
        let mut tracer = PathTracer::spawn(backend, 1).unwrap();
        tracer.start(snapshot(), octree(), 8).unwrap();

        let (_, event) = run_to_end(&mut tracer);
        assert!(matches!(event, TraceEvent::Failed(Error::DeviceResource(_))));
        assert!(!tracer.is_running());
        assert_eq!(gate.live_jobs(), 0);

        // a new job may start after a failure
        tracer.start(snapshot(), octree(), 1).unwrap();
        assert!(tracer.shutdown(TIMEOUT));
    }

    #[test]
    fn test_recycled_image_is_reused() {
        let (backend, gate) = GatedBackend::new();
        let mut tracer = PathTracer::spawn(backend, 1).unwrap();
        tracer.start(snapshot(), octree(), 3).unwrap();

        gate.allow_batches(1);
        let mut first = None;
        assert!(wait_for(TIMEOUT, || {
            if let Some(TraceEvent::Progress { image, .. }) = tracer.poll() {
                first = image.try_into_ready().ok();
            }
            first.is_some()
        }));
        tracer.recycle(first.unwrap());

        gate.allow_batches(2);
        let (_, event) = run_to_end(&mut tracer);
        assert!(matches!(event, TraceEvent::Done(_)));
        assert!(gate.recycled_resolves() >= 1);
        assert!(tracer.shutdown(TIMEOUT));
    }

    #[test]
    fn test_shutdown_while_running() {
        let (backend, gate) = GatedBackend::new();
        let mut tracer = PathTracer::spawn(backend, 1).unwrap();
        tracer.start(snapshot(), octree(), 64).unwrap();
        gate.allow_batches(2);
        assert!(wait_for(TIMEOUT, || gate.batches_traced() == 2));

        gate.allow_batches(u32::MAX);
        assert!(tracer.shutdown(TIMEOUT));
        assert!(gate.batches_traced() < 64);
    }
}
