//! Viewer configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::voxel::svo::MAX_OCTREE_LEVEL;

/// Runtime configuration for the viewer and its workers
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Scene loaded at startup, if any
    pub scene: Option<PathBuf>,
    /// Octree level used for loads issued from the UI
    pub octree_level: u32,
    /// Sample budget for path traces issued from the UI
    pub sample_budget: u32,
    /// Samples accumulated per path tracer dispatch batch
    pub samples_per_batch: u32,
    /// Frames a retired GPU resource is kept alive after its last use
    pub frames_in_flight: u64,
    /// How long shutdown waits for each worker before detaching it
    pub shutdown_timeout: Duration,
    /// Where `X` writes the last path trace
    pub export_path: PathBuf,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_title: "svoview".to_string(),
            window_width: 1280,
            window_height: 720,
            scene: None,
            octree_level: 10,
            sample_budget: 256,
            samples_per_batch: 1,
            frames_in_flight: 2,
            shutdown_timeout: Duration::from_secs(2),
            export_path: PathBuf::from("trace.exr"),
        }
    }
}

impl ViewerConfig {
    /// Apply `--scene`, `--level`, `--samples`, `--batch` and `--export` flags
    pub fn apply_args(mut self, args: &[String]) -> Self {
        let mut i = 0;
        while i < args.len() {
            let value = args.get(i + 1);
            match (args[i].as_str(), value) {
                ("--scene" | "-s", Some(v)) => {
                    self.scene = Some(PathBuf::from(v));
                    i += 1;
                }
                ("--level" | "-l", Some(v)) => {
                    match v.parse::<u32>() {
                        Ok(level) => self.octree_level = level.clamp(1, MAX_OCTREE_LEVEL),
                        Err(_) => log::warn!("Ignoring invalid --level value '{}'", v),
                    }
                    i += 1;
                }
                ("--samples" | "-n", Some(v)) => {
                    match v.parse::<u32>() {
                        Ok(samples) => self.sample_budget = samples.max(1),
                        Err(_) => log::warn!("Ignoring invalid --samples value '{}'", v),
                    }
                    i += 1;
                }
                ("--batch", Some(v)) => {
                    match v.parse::<u32>() {
                        Ok(batch) => self.samples_per_batch = batch.max(1),
                        Err(_) => log::warn!("Ignoring invalid --batch value '{}'", v),
                    }
                    i += 1;
                }
                ("--export" | "-o", Some(v)) => {
                    self.export_path = PathBuf::from(v);
                    i += 1;
                }
                _ => {}
            }
            i += 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults_untouched_without_flags() {
        let config = ViewerConfig::default().apply_args(&args(&["svoview"]));
        assert!(config.scene.is_none());
        assert_eq!(config.octree_level, 10);
        assert_eq!(config.frames_in_flight, 2);
    }

    #[test]
    fn test_flags_override() {
        let config = ViewerConfig::default().apply_args(&args(&[
            "svoview", "--scene", "assets/scene_cube.obj", "--level", "6", "--samples", "64",
        ]));
        assert_eq!(config.scene, Some(PathBuf::from("assets/scene_cube.obj")));
        assert_eq!(config.octree_level, 6);
        assert_eq!(config.sample_budget, 64);
    }

    #[test]
    fn test_level_clamped_and_garbage_ignored() {
        let config = ViewerConfig::default().apply_args(&args(&["--level", "99", "--samples", "many"]));
        assert_eq!(config.octree_level, MAX_OCTREE_LEVEL);
        assert_eq!(config.sample_budget, 256);
    }
}
