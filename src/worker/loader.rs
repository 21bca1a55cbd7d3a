//! Scene loader worker
//!
//! Parses a scene file, voxelizes it and uploads the octree on its own thread.
//! Requests are tagged with an epoch; only the newest one ever produces a
//! completion. Older requests still queued are skipped, and a request that is
//! overtaken mid-flight stops at the next stage boundary.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::time::{Duration, Instant};

use super::handoff::{WorkerThread, gone};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::backend::{Fenced, RenderBackend};
use crate::scene::{Scene, SceneSettings};
use crate::voxel::svo::{Octree, OctreeBuilder};

const WORKER_NAME: &str = "scene-loader";

/// What the loader thread is doing right now
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStage {
    Idle = 0,
    Parsing = 1,
    Voxelizing = 2,
    Uploading = 3,
}

impl LoadStage {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoadStage::Parsing,
            2 => LoadStage::Voxelizing,
            3 => LoadStage::Uploading,
            _ => LoadStage::Idle,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LoadStage::Idle => "idle",
            LoadStage::Parsing => "parsing",
            LoadStage::Voxelizing => "voxelizing",
            LoadStage::Uploading => "uploading",
        }
    }
}

/// Lock-free stage indicator shared with the UI thread
#[derive(Clone, Default)]
struct StageIndicator(Arc<AtomicU8>);

impl StageIndicator {
    fn get(&self) -> LoadStage {
        LoadStage::from_u8(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, stage: LoadStage) {
        self.0.store(stage as u8, Ordering::Relaxed);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    pub path: PathBuf,
    pub level: u32,
}

impl LoadRequest {
    pub fn new(path: impl Into<PathBuf>, level: u32) -> Self {
        Self {
            path: path.into(),
            level,
        }
    }
}

/// Finished load: CPU octree, its device mirror and the scene settings
pub struct LoadedScene<B: RenderBackend> {
    pub octree: Arc<Octree>,
    pub device: B::Octree,
    pub settings: SceneSettings,
}

/// Single completion delivered for the newest request
pub struct LoadCompletion<B: RenderBackend> {
    pub epoch: u64,
    pub request: LoadRequest,
    pub result: Result<LoadedScene<B>>,
}

enum LoaderCommand {
    Load { epoch: u64, request: LoadRequest },
    Shutdown,
}

struct LoadOutcome<B: RenderBackend> {
    epoch: u64,
    request: LoadRequest,
    result: Result<Fenced<LoadedScene<B>>>,
}

/// Outcome received but whose GPU upload is still in flight
struct PendingLoad<B: RenderBackend> {
    epoch: u64,
    request: LoadRequest,
    scene: Fenced<LoadedScene<B>>,
}

/// Main-thread handle to the loader thread
pub struct SceneLoader<B: RenderBackend> {
    commands: Sender<LoaderCommand>,
    outcomes: Receiver<LoadOutcome<B>>,
    latest: Arc<AtomicU64>,
    delivered: u64,
    stage: StageIndicator,
    pending: Option<PendingLoad<B>>,
    disconnected: bool,
    thread: WorkerThread,
}

impl<B: RenderBackend> SceneLoader<B> {
    pub fn spawn(backend: B) -> Result<Self> {
        let (commands, command_rx) = channel();
        let (outcome_tx, outcomes) = channel();
        let latest = Arc::new(AtomicU64::new(0));
        let stage = StageIndicator::default();

        let thread = {
            let latest = latest.clone();
            let stage = stage.clone();
            WorkerThread::spawn(WORKER_NAME, move || {
                loader_loop(backend, command_rx, outcome_tx, latest, stage)
            })?
        };

        Ok(Self {
            commands,
            outcomes,
            latest,
            delivered: 0,
            stage,
            pending: None,
            disconnected: false,
            thread,
        })
    }

    /// Queue a load, superseding every earlier request. Returns its epoch.
    pub fn request_load(&mut self, request: LoadRequest) -> Result<u64> {
        let epoch = self.latest.load(Ordering::Acquire) + 1;
        self.latest.store(epoch, Ordering::Release);
        log::info!(
            "Load #{} requested: {} at level {}",
            epoch,
            request.path.display(),
            request.level
        );
        self.commands
            .send(LoaderCommand::Load { epoch, request })
            .map_err(|_| gone(WORKER_NAME))?;
        Ok(epoch)
    }

    pub fn stage(&self) -> LoadStage {
        self.stage.get()
    }

    /// Whether the newest request has not produced its completion yet
    pub fn is_busy(&self) -> bool {
        self.delivered < self.latest.load(Ordering::Acquire)
    }

    /// Non-blocking. Yields the completion of the newest request once its
    /// device upload has finished; anything older is dropped.
    pub fn poll(&mut self) -> Option<LoadCompletion<B>> {
        let latest = self.latest.load(Ordering::Acquire);

        loop {
            match self.outcomes.try_recv() {
                Ok(outcome) if outcome.epoch != latest => {
                    log::debug!("Discarding superseded load #{}", outcome.epoch);
                }
                Ok(LoadOutcome {
                    epoch,
                    request,
                    result: Err(error),
                }) => {
                    self.pending = None;
                    self.delivered = epoch;
                    return Some(LoadCompletion {
                        epoch,
                        request,
                        result: Err(error),
                    });
                }
                Ok(LoadOutcome {
                    epoch,
                    request,
                    result: Ok(scene),
                }) => {
                    self.pending = Some(PendingLoad {
                        epoch,
                        request,
                        scene,
                    });
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.disconnected {
                        break;
                    }
                    self.disconnected = true;
                    self.delivered = latest;
                    return Some(LoadCompletion {
                        epoch: latest,
                        request: LoadRequest::new(PathBuf::new(), 0),
                        result: Err(gone(WORKER_NAME)),
                    });
                }
            }
        }

        let pending = self.pending.take()?;
        if pending.epoch != latest {
            log::debug!("Discarding superseded load #{}", pending.epoch);
            return None;
        }
        match pending.scene.try_into_ready() {
            Ok(scene) => {
                self.delivered = pending.epoch;
                Some(LoadCompletion {
                    epoch: pending.epoch,
                    request: pending.request,
                    result: Ok(scene),
                })
            }
            Err(scene) => {
                self.pending = Some(PendingLoad { scene, ..pending });
                None
            }
        }
    }

    /// Stop the thread, waiting at most `timeout` before detaching it
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let _ = self.commands.send(LoaderCommand::Shutdown);
        // a load in progress stops at its next stage boundary
        self.latest.fetch_add(1, Ordering::AcqRel);
        self.pending = None;
        self.thread.join_timeout(timeout)
    }
}

fn loader_loop<B: RenderBackend>(
    backend: B,
    commands: Receiver<LoaderCommand>,
    outcomes: Sender<LoadOutcome<B>>,
    latest: Arc<AtomicU64>,
    stage: StageIndicator,
) {
    while let Ok(command) = commands.recv() {
        let (epoch, request) = match command {
            LoaderCommand::Load { epoch, request } => match drain_to_latest(&commands, epoch, request) {
                Some(newest) => newest,
                None => break,
            },
            LoaderCommand::Shutdown => break,
        };

        let superseded = || latest.load(Ordering::Acquire) != epoch;
        let result = run_load(&backend, &request, &stage, &superseded);
        stage.set(LoadStage::Idle);

        let result = match result {
            Ok(Some(scene)) => Ok(scene),
            Ok(None) => {
                log::info!("Load #{} superseded, abandoned", epoch);
                continue;
            }
            Err(error) => {
                log::warn!("Load #{} failed: {}", epoch, error);
                Err(error)
            }
        };

        if outcomes.send(LoadOutcome { epoch, request, result }).is_err() {
            break;
        }
    }
    log::debug!("Scene loader exiting");
}

/// Keep only the newest queued request. `None` means shutdown was requested.
fn drain_to_latest(
    commands: &Receiver<LoaderCommand>,
    mut epoch: u64,
    mut request: LoadRequest,
) -> Option<(u64, LoadRequest)> {
    while let Ok(command) = commands.try_recv() {
        match command {
            LoaderCommand::Load {
                epoch: newer,
                request: newer_request,
            } => {
                log::debug!("Load #{} skipped for #{}", epoch, newer);
                epoch = newer;
                request = newer_request;
            }
            LoaderCommand::Shutdown => return None,
        }
    }
    Some((epoch, request))
}

/// Run one load. `Ok(None)` means it was superseded between stages.
fn run_load<B: RenderBackend>(
    backend: &B,
    request: &LoadRequest,
    stage: &StageIndicator,
    superseded: &dyn Fn() -> bool,
) -> Result<Option<Fenced<LoadedScene<B>>>> {
    stage.set(LoadStage::Parsing);
    let builder = OctreeBuilder::new(request.level)?;
    let Scene { mesh, settings } = Scene::load(&request.path)?;
    if superseded() {
        return Ok(None);
    }

    stage.set(LoadStage::Voxelizing);
    let start = Instant::now();
    let octree = builder.build_with_emission(&mesh.triangles, |id| settings.is_emissive(id))?;
    octree.validate()?;
    log::info!(
        "Built octree for {}: {} triangles, {} nodes, {} leaves, {:.2} MB in {:.1?}",
        request.path.display(),
        mesh.triangles.len(),
        octree.node_count(),
        octree.leaf_count(),
        octree.memory_usage() as f64 / (1024.0 * 1024.0),
        start.elapsed()
    );
    if superseded() {
        return Ok(None);
    }

    stage.set(LoadStage::Uploading);
    let octree = Arc::new(octree);
    let device = backend.upload_octree(&octree).map_err(|e| match e {
        Error::DeviceResource(message) => Error::Load(format!("octree upload failed: {message}")),
        other => other,
    })?;

    Ok(Some(device.map(|device| LoadedScene {
        octree,
        device,
        settings,
    })))
}
