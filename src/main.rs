//! svoview - interactive viewer

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowId},
};

use svoview::core::{
    camera_controller::FlyController, config::ViewerConfig, logging, logging::LogRing, time::FrameTimer,
};
use svoview::render::{GpuContext, WgpuBackend, WindowRenderer};
use svoview::session::{Controller, SessionState};

/// How often the title is refreshed
const TITLE_INTERVAL_FRAMES: u64 = 15;

struct Viewer {
    config: ViewerConfig,
    log: Arc<LogRing>,
    window: Option<Arc<Window>>,
    renderer: Option<WindowRenderer>,
    controller: Option<Controller<WgpuBackend>>,
    fly: FlyController,
    timer: FrameTimer,
    cursor_grabbed: bool,
    failed: bool,
}

impl Viewer {
    fn new(config: ViewerConfig, log: Arc<LogRing>) -> Self {
        Self {
            config,
            log,
            window: None,
            renderer: None,
            controller: None,
            fly: FlyController::default(),
            timer: FrameTimer::new(),
            cursor_grabbed: false,
            failed: false,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> svoview::core::Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.config.window_title.clone())
            .with_inner_size(PhysicalSize::new(self.config.window_width, self.config.window_height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|e| svoview::core::Error::Window(e.to_string()))?,
        );

        let gpu = pollster::block_on(GpuContext::new(window.clone()))?;
        let (width, height) = gpu.size();
        let backend = WgpuBackend::new(&gpu);
        let mut controller = Controller::new(backend.clone(), self.config.clone(), self.log.clone())?;
        controller.set_viewport(width, height);
        self.fly.sync_with(controller.camera());

        if let Some(scene) = &self.config.scene {
            controller.request_load(scene.clone(), self.config.octree_level);
        }

        log::info!("Window created: {}x{}", width, height);
        self.renderer = Some(WindowRenderer::new(gpu, window.clone(), &backend));
        self.controller = Some(controller);
        self.window = Some(window);
        Ok(())
    }

    fn toggle_cursor_grab(&mut self) {
        let Some(window) = &self.window else {
            return;
        };
        self.cursor_grabbed = !self.cursor_grabbed;
        if self.cursor_grabbed {
            window
                .set_cursor_grab(CursorGrabMode::Confined)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked))
                .ok();
            window.set_cursor_visible(false);
        } else {
            window.set_cursor_grab(CursorGrabMode::None).ok();
            window.set_cursor_visible(true);
        }
        self.fly.set_mouse_captured(self.cursor_grabbed);
    }

    /// Keys that talk to the session rather than the camera
    fn command_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode) {
        match key {
            KeyCode::Escape => {
                if self.cursor_grabbed {
                    self.toggle_cursor_grab();
                } else {
                    event_loop.exit();
                }
            }
            KeyCode::Tab => self.toggle_cursor_grab(),
            _ => {}
        }

        let Some(controller) = &mut self.controller else {
            return;
        };
        match key {
            KeyCode::KeyL => {
                let source = controller.settings().source.clone();
                let scene = self
                    .config
                    .scene
                    .clone()
                    .or_else(|| (!source.as_os_str().is_empty()).then_some(source));
                match scene {
                    Some(scene) => controller.request_load(scene, self.config.octree_level),
                    None => log::warn!("No scene to load; start with --scene PATH"),
                }
            }
            KeyCode::KeyP => {
                if let Err(e) = controller.start_path_trace(self.config.sample_budget) {
                    log::warn!("Cannot start path trace: {}", e);
                }
            }
            KeyCode::KeyO => {
                if !controller.stop_path_trace() {
                    log::info!("No path trace running");
                }
            }
            KeyCode::KeyX => {
                if let Err(e) = controller.export_last_trace(&self.config.export_path) {
                    log::warn!("Export failed: {}", e);
                }
            }
            _ => {}
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(controller), Some(renderer)) = (&mut self.controller, &mut self.renderer) else {
            return;
        };
        self.timer.tick();

        if controller.poll() == Some(SessionState::OctreeTracer) {
            // scale movement to the scene after each load
            if let Some(octree) = controller.octree() {
                self.fly.speed = octree.bounds().size().x * 0.25;
            }
            self.fly.sync_with(controller.camera());
        }
        self.fly.update(controller.camera_mut(), self.timer.delta_secs());

        if let Err(e) = controller.frame(renderer) {
            if e.is_fatal() {
                log::error!("Rendering failed: {}", e);
                self.failed = true;
                event_loop.exit();
                return;
            }
            log::warn!("Frame dropped: {}", e);
        }

        if let Some(error) = controller.fatal_error() {
            log::error!("Shutting down after fatal error: {}", error);
            self.failed = true;
            event_loop.exit();
            return;
        }

        if self.timer.frame_count() % TITLE_INTERVAL_FRAMES == 0 {
            renderer.window().set_title(&format!(
                "{} | {:.0} FPS",
                controller.status_line(),
                self.timer.fps()
            ));
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.shutdown();
        }
        self.renderer = None;
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            log::error!("Failed to start viewer: {}", e);
            self.failed = true;
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(size.width, size.height);
                }
                if let Some(controller) = &mut self.controller {
                    controller.set_viewport(size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => self.fly.release_all(),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.fly.key(code, event.state.is_pressed());
                    if event.state.is_pressed() && !event.repeat {
                        self.command_key(event_loop, code);
                    }
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.fly.mouse_motion(delta);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() {
    let log = logging::init();
    let args: Vec<String> = std::env::args().collect();
    let config = ViewerConfig::default().apply_args(&args);
    log::info!("svoview starting...");

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut viewer = Viewer::new(config, log);
    if let Err(e) = event_loop.run_app(&mut viewer) {
        log::error!("Event loop error: {}", e);
        viewer.failed = true;
    }
    viewer.shutdown();

    if viewer.failed {
        std::process::exit(1);
    }
}
