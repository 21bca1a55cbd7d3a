//! Frame timing utilities

use std::time::{Duration, Instant};

/// Longest delta handed to camera movement; hitches are clamped to this
const MAX_DELTA: Duration = Duration::from_millis(100);

/// Tracks frame timing and calculates FPS
pub struct FrameTimer {
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
    fps_timer: Instant,
    fps: f32,
    fps_frame_count: u32,
}

impl FrameTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            delta: Duration::ZERO,
            frame_count: 0,
            fps_timer: now,
            fps: 0.0,
            fps_frame_count: 0,
        }
    }

    /// Call once per frame to update timing
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    fn tick_at(&mut self, now: Instant) {
        self.delta = now.saturating_duration_since(self.last_frame).min(MAX_DELTA);
        self.last_frame = now;
        self.frame_count += 1;
        self.fps_frame_count += 1;

        let fps_elapsed = now.saturating_duration_since(self.fps_timer);
        if fps_elapsed >= Duration::from_secs(1) {
            self.fps = self.fps_frame_count as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = 0;
            self.fps_timer = now;
        }
    }

    /// Delta time in seconds, clamped
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Current FPS (updated every second)
    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_is_clamped() {
        let mut timer = FrameTimer::new();
        let start = timer.last_frame;
        timer.tick_at(start + Duration::from_secs(3));
        assert_eq!(timer.delta_secs(), MAX_DELTA.as_secs_f32());
        assert_eq!(timer.frame_count(), 1);
    }

    #[test]
    fn test_fps_updates_after_one_second() {
        let mut timer = FrameTimer::new();
        let start = timer.last_frame;
        for i in 1..=60u64 {
            timer.tick_at(start + Duration::from_millis(i * 1000 / 60));
        }
        assert!((timer.fps() - 60.0).abs() < 1.0, "fps was {}", timer.fps());
    }
}
