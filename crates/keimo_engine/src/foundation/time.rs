//! Frame timing
//!
//! `FrameClock` tracks time since engine start and per-frame deltas;
//! `FpsCounter` accumulates frame times and yields an average once per
//! reporting window.

use std::time::{Duration, Instant};

/// Clock started when the engine starts, ticked once per frame
pub struct FrameClock {
    started: Instant,
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Create a clock starting now
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_frame: now,
            delta: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Mark the end of a frame and return its duration
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        self.delta = now.duration_since(self.last_frame);
        self.last_frame = now;
        self.frame_count += 1;
        self.delta
    }

    /// Duration of the last completed frame
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Seconds since the clock was created
    pub fn elapsed_secs(&self) -> f32 {
        self.started.elapsed().as_secs_f32()
    }

    /// Number of ticks so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Averages frame times over a fixed reporting window
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window: Duration,
    accumulated: Duration,
    frames: u32,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl FpsCounter {
    /// Create a counter that reports once per `window`
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            accumulated: Duration::ZERO,
            frames: 0,
        }
    }

    /// Record one frame. Returns the average FPS when the window has elapsed,
    /// and starts a new window.
    pub fn record(&mut self, frame_time: Duration) -> Option<f64> {
        self.accumulated += frame_time;
        self.frames += 1;

        if self.accumulated <= self.window {
            return None;
        }

        let fps = f64::from(self.frames) / self.accumulated.as_secs_f64();
        self.accumulated = Duration::ZERO;
        self.frames = 0;
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_counter_reports_after_window() {
        let mut counter = FpsCounter::new(Duration::from_millis(100));
        for _ in 0..4 {
            assert!(counter.record(Duration::from_millis(25)).is_none());
        }
        let fps = counter.record(Duration::from_millis(25)).expect("window elapsed");
        approx::assert_relative_eq!(fps, 40.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fps_counter_resets_between_windows() {
        let mut counter = FpsCounter::new(Duration::from_millis(10));
        assert!(counter.record(Duration::from_millis(20)).is_some());
        assert!(counter.record(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn test_frame_clock_counts_ticks() {
        let mut clock = FrameClock::new();
        clock.tick();
        clock.tick();
        assert_eq!(clock.frame_count(), 2);
        assert!(clock.elapsed_secs() >= 0.0);
    }
}
