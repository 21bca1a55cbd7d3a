//! Session controller
//!
//! Owns the session state, the live octree and both workers. Everything the
//! UI wants goes in as an intent; [`Controller::poll`] drains worker handoffs
//! and intents and applies at most one state transition, then
//! [`Controller::frame`] draws whatever the state says.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::Vec3;

use super::notice::{Notice, Notices, Severity};
use super::retire::RetireQueue;
use super::state::{Action, SessionEvent, SessionState, transition};
use crate::core::camera::Camera;
use crate::core::config::ViewerConfig;
use crate::core::error::Error;
use crate::core::logging::LogRing;
use crate::core::types::Result;
use crate::render::backend::{Fenced, RenderBackend};
use crate::render::frame::FrameSink;
use crate::scene::{SceneSettings, SceneSnapshot};
use crate::voxel::svo::Octree;
use crate::worker::{LoadCompletion, LoadRequest, LoadStage, LoadedScene, PathTracer, SceneLoader, TraceEvent, TraceResult};

/// Snapshot of what the session is doing, for status displays
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub state: SessionState,
    pub load_stage: LoadStage,
    /// Samples in the newest path tracer image
    pub samples: u32,
    pub budget: u32,
}

struct LiveOctree<B: RenderBackend> {
    cpu: Arc<Octree>,
    device: Arc<B::Octree>,
}

enum Intent {
    Load(LoadRequest),
    StartTrace { budget: u32 },
    StopTrace,
}

enum Input<B: RenderBackend> {
    Load(LoadCompletion<B>),
    Trace(TraceEvent<B::Image>),
    Intent(Intent),
}

impl<B: RenderBackend> Input<B> {
    fn event(&self) -> Option<SessionEvent> {
        let event = match self {
            Input::Load(completion) if completion.result.is_ok() => SessionEvent::LoadSucceeded,
            Input::Load(_) => SessionEvent::LoadFailed,
            Input::Trace(TraceEvent::Done(_)) => SessionEvent::TraceDone,
            Input::Trace(TraceEvent::Cancelled(_)) => SessionEvent::TraceCancelled,
            Input::Trace(TraceEvent::Failed(_)) => SessionEvent::TraceFailed,
            Input::Trace(TraceEvent::Progress { .. }) => return None,
            Input::Intent(Intent::Load(_)) => SessionEvent::LoadRequested,
            Input::Intent(Intent::StartTrace { .. }) => SessionEvent::PathTraceRequested,
            Input::Intent(Intent::StopTrace) => SessionEvent::StopRequested,
        };
        Some(event)
    }
}

pub struct Controller<B: RenderBackend> {
    config: ViewerConfig,
    backend: B,
    state: SessionState,
    loader: SceneLoader<B>,
    tracer: PathTracer<B>,
    intents: VecDeque<Intent>,
    /// Handoffs taken from the workers but not applied yet
    load_outcome: Option<LoadCompletion<B>>,
    trace_outcome: Option<TraceEvent<B::Image>>,

    camera: Camera,
    viewport: (u32, u32),
    settings: SceneSettings,
    live: Option<LiveOctree<B>>,

    /// Newest progress image whose resolve may still be running
    incoming: Option<Fenced<B::Image>>,
    displayed: Option<B::Image>,
    trace_samples: u32,
    trace_budget: u32,
    last_trace: Option<TraceResult>,

    retired_octrees: RetireQueue<Arc<B::Octree>>,
    retired_images: RetireQueue<Fenced<B::Image>>,

    notices: Notices,
    log: Arc<LogRing>,
    fatal: Option<Error>,
    shut_down: bool,
}

impl<B: RenderBackend + Clone> Controller<B> {
    pub fn new(backend: B, config: ViewerConfig, log: Arc<LogRing>) -> Result<Self> {
        let loader = SceneLoader::spawn(backend.clone())?;
        let tracer = PathTracer::spawn(backend.clone(), config.samples_per_batch)?;
        let viewport = (config.window_width.max(1), config.window_height.max(1));
        let mut camera = Camera::default();
        camera.set_aspect(viewport.0 as f32, viewport.1 as f32);

        log::info!("Session started on the {} backend", backend.name());
        Ok(Self {
            retired_octrees: RetireQueue::new(config.frames_in_flight),
            retired_images: RetireQueue::new(config.frames_in_flight),
            config,
            backend,
            state: SessionState::Empty,
            loader,
            tracer,
            intents: VecDeque::new(),
            load_outcome: None,
            trace_outcome: None,
            camera,
            viewport,
            settings: SceneSettings::default(),
            live: None,
            incoming: None,
            displayed: None,
            trace_samples: 0,
            trace_budget: 0,
            last_trace: None,
            notices: Notices::new(),
            log,
            fatal: None,
            shut_down: false,
        })
    }
}

impl<B: RenderBackend> Controller<B> {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Load a scene, superseding any load still in flight
    pub fn request_load(&mut self, path: impl Into<PathBuf>, level: u32) {
        self.intents.push_back(Intent::Load(LoadRequest::new(path, level)));
    }

    /// Start a progressive path trace of the current view
    pub fn start_path_trace(&mut self, budget: u32) -> Result<()> {
        let queued = self
            .intents
            .iter()
            .any(|i| matches!(i, Intent::StartTrace { .. }));
        if queued || self.tracer.is_running() || self.state == SessionState::PathTracing {
            return Err(Error::AlreadyRunning);
        }
        // a queued load replaces the octree before the trace could start
        let load_queued = self.intents.iter().any(|i| matches!(i, Intent::Load(_)));
        if self.state != SessionState::OctreeTracer || load_queued {
            return Err(Error::NoOctree);
        }
        self.intents.push_back(Intent::StartTrace { budget });
        Ok(())
    }

    /// Ask the running path trace to stop. The session returns to the
    /// octree view once the worker confirms. Returns false if nothing runs.
    pub fn stop_path_trace(&mut self) -> bool {
        if self.state != SessionState::PathTracing {
            return false;
        }
        self.intents.push_back(Intent::StopTrace);
        true
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.viewport = (width, height);
            self.camera.set_aspect(width as f32, height as f32);
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    /// CPU copy of the live octree
    pub fn octree(&self) -> Option<&Arc<Octree>> {
        self.live.as_ref().map(|live| &live.cpu)
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn dismiss_notice(&mut self, id: u64) -> bool {
        self.notices.dismiss(id)
    }

    pub fn log(&self) -> &Arc<LogRing> {
        &self.log
    }

    pub fn progress(&self) -> Progress {
        Progress {
            state: self.state,
            load_stage: self.loader.stage(),
            samples: self.trace_samples,
            budget: self.trace_budget,
        }
    }

    /// Result of the most recent finished or cancelled path trace
    pub fn last_trace(&self) -> Option<&TraceResult> {
        self.last_trace.as_ref()
    }

    pub fn export_last_trace(&mut self, path: &Path) -> Result<()> {
        let trace = self
            .last_trace
            .as_ref()
            .ok_or_else(|| Error::Export("no path trace to export".into()))?;
        trace.image.save(path)?;
        self.notices.push(
            Severity::Info,
            format!("Exported {} samples to {}", trace.samples, path.display()),
        );
        Ok(())
    }

    /// Error that ended the session, if any
    pub fn fatal_error(&self) -> Option<&Error> {
        self.fatal.as_ref()
    }

    /// One-line summary for a window title
    pub fn status_line(&self) -> String {
        let mut line = format!("{} | {}", self.config.window_title, self.state);
        match self.state {
            SessionState::Loading => {
                let _ = write!(line, " ({})", self.loader.stage().label());
            }
            SessionState::PathTracing => {
                let _ = write!(line, " {}/{}", self.trace_samples, self.trace_budget);
            }
            SessionState::OctreeTracer => {
                if let Some(octree) = self.octree() {
                    let _ = write!(line, " ({} nodes)", octree.node_count());
                }
            }
            SessionState::Empty => {}
        }
        if let Some(notice) = self.notices.latest() {
            let _ = write!(line, " | {}", notice.message);
        }
        line
    }

    /// Drain worker handoffs and queued intents without blocking, applying
    /// at most one state transition. Returns the new state if one happened.
    pub fn poll(&mut self) -> Option<SessionState> {
        if self.fatal.is_some() {
            return None;
        }
        self.backend.maintain();
        if let Err(error) = self.backend.check_device() {
            self.fail(error);
            return None;
        }

        self.drain_trace_events();
        self.promote_incoming();
        if self.load_outcome.is_none() {
            self.load_outcome = self.loader.poll();
        }

        loop {
            let input = if let Some(event) = self.trace_outcome.take() {
                Input::Trace(event)
            } else if let Some(completion) = self.load_outcome.take() {
                Input::Load(completion)
            } else if let Some(intent) = self.intents.pop_front() {
                Input::Intent(intent)
            } else {
                return None;
            };

            if let Some(next) = self.apply(input) {
                return Some(next);
            }
            if self.fatal.is_some() {
                return None;
            }
        }
    }

    /// Draw the frame for the current state and present it
    pub fn frame<S: FrameSink<B>>(&mut self, sink: &mut S) -> Result<()> {
        let drawn = match (self.state, &self.displayed, &self.live) {
            (SessionState::Loading, _, _) => sink.draw_loading(self.loader.stage()),
            (SessionState::PathTracing, Some(image), _) => sink.draw_image(image),
            // until the first batch lands the octree view stays up
            (SessionState::PathTracing | SessionState::OctreeTracer, _, Some(live)) => {
                sink.draw_octree(&live.device, &self.camera, &self.settings)
            }
            _ => sink.draw_empty(),
        };
        let result = drawn.and_then(|()| sink.present());
        self.end_frame();
        result
    }

    /// Stop both workers and release every resource. Returns whether both
    /// threads joined within the configured timeout.
    pub fn shutdown(&mut self) -> bool {
        if self.shut_down {
            return true;
        }
        self.shut_down = true;

        let timeout = self.config.shutdown_timeout;
        let tracer_joined = self.tracer.shutdown(timeout);
        let loader_joined = self.loader.shutdown(timeout);

        self.incoming = None;
        self.displayed = None;
        self.retired_images.drain();
        self.retired_octrees.drain();
        self.live = None;
        log::info!(
            "Session shut down (path tracer {}, loader {})",
            if tracer_joined { "joined" } else { "detached" },
            if loader_joined { "joined" } else { "detached" }
        );
        tracer_joined && loader_joined
    }

    fn apply(&mut self, input: Input<B>) -> Option<SessionState> {
        let event = input.event()?;
        let Some(t) = transition(self.state, event) else {
            self.ignore(input);
            return None;
        };

        match self.perform(t.action, input) {
            Ok(()) => {
                if t.next != self.state {
                    log::info!("Session {} -> {} ({:?})", self.state, t.next, event);
                }
                self.state = t.next;
                Some(t.next)
            }
            Err(error) => {
                self.report(error);
                None
            }
        }
    }

    fn perform(&mut self, action: Action, input: Input<B>) -> Result<()> {
        match (action, input) {
            (Action::RequestLoad { cancel_trace }, Input::Intent(Intent::Load(request))) => {
                if cancel_trace {
                    self.tracer.stop();
                    self.release_trace_images();
                }
                self.load_outcome = None;
                self.loader.request_load(request)?;
            }
            (Action::PublishOctree, Input::Load(LoadCompletion { result: Ok(scene), .. })) => {
                self.publish(scene);
            }
            (Action::ReportLoadError, Input::Load(LoadCompletion { request, result: Err(error), .. })) => {
                self.notices.push(
                    Severity::Error,
                    format!("Failed to load {}: {}", request.path.display(), error),
                );
                if let Some(previous) = self.live.take() {
                    self.retired_octrees.retire(previous.device);
                }
                if error.is_fatal() {
                    self.fail(error);
                }
            }
            (Action::StartPathTrace, Input::Intent(Intent::StartTrace { budget })) => {
                let live = self.live.as_ref().ok_or(Error::NoOctree)?;
                let (width, height) = self.viewport;
                let snapshot = SceneSnapshot::capture(&self.settings, &self.camera, width, height);
                self.tracer.start(snapshot, live.device.clone(), budget)?;
                self.trace_samples = 0;
                self.trace_budget = budget;
            }
            (Action::RequestCancel, Input::Intent(Intent::StopTrace)) => {
                if self.tracer.stop() {
                    log::info!("Path trace stop requested at {} samples", self.trace_samples);
                }
            }
            (Action::ReleaseTraceImage, Input::Trace(event)) => {
                self.finish_trace(event);
                self.release_trace_images();
            }
            (action, _) => log::debug!("Action {:?} had no matching input", action),
        }
        Ok(())
    }

    /// Bookkeeping for inputs the current state drops
    fn ignore(&mut self, input: Input<B>) {
        match input {
            Input::Trace(event) => {
                // a job cancelled by a load still delivers its result
                self.finish_trace(event);
                self.release_trace_images();
            }
            Input::Load(LoadCompletion {
                result: Err(error), ..
            }) if error.is_fatal() => self.fail(error),
            Input::Load(completion) => {
                log::debug!("Dropping load #{} in state {}", completion.epoch, self.state);
            }
            Input::Intent(_) => log::debug!("Dropping intent in state {}", self.state),
        }
    }

    fn publish(&mut self, scene: LoadedScene<B>) {
        let LoadedScene {
            octree,
            device,
            settings,
        } = scene;
        let previous = self.live.replace(LiveOctree {
            cpu: octree,
            device: Arc::new(device),
        });
        if let Some(previous) = previous {
            self.retired_octrees.retire(previous.device);
        }
        self.settings = settings;
        self.place_camera();

        if let Some(live) = &self.live {
            self.notices.push(
                Severity::Info,
                format!(
                    "Loaded {} ({} nodes, depth {})",
                    self.settings.source.display(),
                    live.cpu.node_count(),
                    live.cpu.max_depth()
                ),
            );
        }
    }

    fn place_camera(&mut self) {
        let (width, height) = self.viewport;
        match (&self.settings.camera, &self.live) {
            (Some(setup), _) => {
                let mut camera = Camera::look_at(
                    Vec3::from_array(setup.position),
                    Vec3::from_array(setup.target),
                    Vec3::Y,
                );
                camera.fov_y = setup.fov_y_degrees.to_radians();
                self.camera = camera;
            }
            (None, Some(live)) => {
                let bounds = live.cpu.bounds();
                self.camera
                    .frame_bounds(bounds.center(), bounds.half_extent().length());
            }
            (None, None) => {}
        }
        self.camera.set_aspect(width as f32, height as f32);
    }

    fn drain_trace_events(&mut self) {
        while self.trace_outcome.is_none() {
            let Some(event) = self.tracer.poll() else {
                break;
            };
            match event {
                TraceEvent::Progress { image, samples, budget } => {
                    if self.state == SessionState::PathTracing {
                        if let Some(stale) = self.incoming.replace(image) {
                            self.retired_images.retire(stale);
                        }
                        self.trace_samples = samples;
                        self.trace_budget = budget;
                    } else {
                        self.retired_images.retire(image);
                    }
                }
                terminal => self.trace_outcome = Some(terminal),
            }
        }
    }

    /// Display the newest progress image once its resolve has finished
    fn promote_incoming(&mut self) {
        let Some(incoming) = self.incoming.take() else {
            return;
        };
        match incoming.try_into_ready() {
            Ok(image) => {
                if let Some(old) = self.displayed.replace(image) {
                    self.retired_images.retire(Fenced::ready(old));
                }
            }
            Err(pending) => self.incoming = Some(pending),
        }
    }

    fn finish_trace(&mut self, event: TraceEvent<B::Image>) {
        match event {
            TraceEvent::Done(result) => {
                self.trace_samples = result.samples;
                self.notices.push(
                    Severity::Info,
                    format!("Path trace finished with {} samples", result.samples),
                );
                self.last_trace = Some(result);
            }
            TraceEvent::Cancelled(result) => {
                self.trace_samples = result.samples;
                self.notices.push(
                    Severity::Info,
                    format!("Path trace stopped at {} samples", result.samples),
                );
                self.last_trace = Some(result);
            }
            TraceEvent::Failed(error) => {
                self.notices
                    .push(Severity::Error, format!("Path trace aborted: {}", error));
                if error.is_fatal() {
                    self.fail(error);
                }
            }
            TraceEvent::Progress { image, .. } => self.retired_images.retire(image),
        }
    }

    fn release_trace_images(&mut self) {
        if let Some(image) = self.incoming.take() {
            self.retired_images.retire(image);
        }
        if let Some(image) = self.displayed.take() {
            self.retired_images.retire(Fenced::ready(image));
        }
    }

    fn end_frame(&mut self) {
        for image in self.retired_images.advance() {
            match image.try_into_ready() {
                Ok(image) => self.tracer.recycle(image),
                Err(pending) => self.retired_images.retire(pending),
            }
        }
        let released = self.retired_octrees.advance();
        if !released.is_empty() {
            log::debug!("Released {} retired octree(s)", released.len());
        }
    }

    fn report(&mut self, error: Error) {
        if error.is_fatal() {
            self.fail(error);
        } else {
            self.notices.push(Severity::Warning, error.to_string());
        }
    }

    fn fail(&mut self, error: Error) {
        if self.fatal.is_some() {
            return;
        }
        self.notices
            .push(Severity::Error, format!("Fatal: {}", error));
        self.tracer.stop();
        self.fatal = Some(error);
    }
}

impl<B: RenderBackend> Drop for Controller<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
