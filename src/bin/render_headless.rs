//! Headless renderer: load a scene, path trace it on the CPU backend and
//! write the result as EXR or HDR.
//!
//! Usage: render_headless --scene PATH [--level N] [--samples N] [--batch N]
//!        [--width W] [--height H] [--output FILE] [--preview FILE]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use svoview::core::{Error, Result, config::ViewerConfig, logging, logging::LogRing};
use svoview::render::{CpuBackend, HeadlessSink};
use svoview::scene::SceneSnapshot;
use svoview::session::{Controller, SessionState};

const POLL_INTERVAL: Duration = Duration::from_millis(2);
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(2);

struct HeadlessArgs {
    config: ViewerConfig,
    preview: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> HeadlessArgs {
    let mut config = ViewerConfig {
        window_width: 640,
        window_height: 360,
        export_path: PathBuf::from("render.exr"),
        ..ViewerConfig::default()
    }
    .apply_args(args);
    let mut preview = None;

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--width", Some(v)) => {
                config.window_width = v.parse().unwrap_or(config.window_width).max(1);
                i += 1;
            }
            ("--height", Some(v)) => {
                config.window_height = v.parse().unwrap_or(config.window_height).max(1);
                i += 1;
            }
            ("--output", Some(v)) => {
                config.export_path = PathBuf::from(v);
                i += 1;
            }
            ("--preview", Some(v)) => {
                preview = Some(PathBuf::from(v));
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    HeadlessArgs { config, preview }
}

/// Poll and draw until the session leaves `state`
fn run_while(
    controller: &mut Controller<CpuBackend>,
    sink: &mut HeadlessSink,
    state: SessionState,
) -> Result<SessionState> {
    let mut last_log = Instant::now();
    loop {
        controller.poll();
        controller.frame(sink)?;

        if let Some(error) = controller.fatal_error() {
            return Err(match error {
                Error::WorkerGone(name) => Error::WorkerGone(name),
                other => Error::DeviceLost(other.to_string()),
            });
        }
        if controller.state() != state {
            return Ok(controller.state());
        }
        if last_log.elapsed() >= PROGRESS_LOG_INTERVAL {
            let progress = controller.progress();
            match state {
                SessionState::Loading => log::info!("Loading: {}", progress.load_stage.label()),
                _ => log::info!("Traced {}/{} samples", progress.samples, progress.budget),
            }
            last_log = Instant::now();
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn latest_notice(controller: &Controller<CpuBackend>) -> String {
    controller
        .notices()
        .last()
        .map(|n| n.message.clone())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn run(args: HeadlessArgs, log: Arc<LogRing>) -> Result<()> {
    let config = args.config;
    let scene = config.scene.clone().ok_or_else(|| {
        Error::Load("no scene given; usage: render_headless --scene PATH [--samples N] [--output FILE]".into())
    })?;

    let mut controller = Controller::new(CpuBackend::new(), config.clone(), log)?;
    let mut sink = HeadlessSink::new();

    controller.request_load(scene, config.octree_level);
    controller.poll();
    if run_while(&mut controller, &mut sink, SessionState::Loading)? != SessionState::OctreeTracer {
        return Err(Error::Load(latest_notice(&controller)));
    }

    if let (Some(path), Some(octree)) = (&args.preview, controller.octree()) {
        let snapshot = SceneSnapshot::capture(
            controller.settings(),
            controller.camera(),
            config.window_width,
            config.window_height,
        );
        CpuBackend::new().render_preview(octree, &snapshot)?.save(path)?;
        log::info!("Wrote preview to {}", path.display());
    }

    let start = Instant::now();
    controller.start_path_trace(config.sample_budget)?;
    controller.poll();
    run_while(&mut controller, &mut sink, SessionState::PathTracing)?;

    let samples = controller
        .last_trace()
        .map(|trace| trace.samples)
        .ok_or_else(|| Error::Export(latest_notice(&controller)))?;
    controller.export_last_trace(&config.export_path)?;
    log::info!(
        "Wrote {} ({} samples, {} frames, {:.1?})",
        config.export_path.display(),
        samples,
        sink.presented(),
        start.elapsed()
    );

    controller.shutdown();
    Ok(())
}

fn main() {
    let log = logging::init();
    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(parse_args(&args), log) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
