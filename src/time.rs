//! Frame-rate monitoring.
//!
//! The monitor is fed the wall-clock duration of each frame and averages the
//! frame rate over a sampling window. A window that averages below the floor
//! trips the low-throughput halt, which stays latched until [`reset`].
//!
//! [`reset`]: FrameMonitor::reset
//!
//! # Example
//!
//! ```ignore
//! use flockgrid::time::FrameMonitor;
//!
//! let mut monitor = FrameMonitor::default();
//! let start = std::time::Instant::now();
//! // ... run a frame ...
//! if let Some(fps) = monitor.record_frame(start.elapsed()) {
//!     println!("sampled {fps:.1} FPS");
//! }
//! ```

use std::time::Duration;

/// Below this rate the simulation is considered stuck.
pub const DEFAULT_MIN_FPS: f32 = 10.0;

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct FrameMonitor {
    /// How long to accumulate frames before computing a rate.
    sample_interval: Duration,
    min_fps: f32,
    window: Duration,
    window_frames: u32,
    /// Rate of the last complete window.
    fps: Option<f32>,
    tripped: bool,
    /// Frames since creation or reset.
    frame_count: u64,
}

impl Default for FrameMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_FPS, DEFAULT_SAMPLE_INTERVAL)
    }
}

impl FrameMonitor {
    pub fn new(min_fps: f32, sample_interval: Duration) -> Self {
        Self {
            sample_interval,
            min_fps,
            window: Duration::ZERO,
            window_frames: 0,
            fps: None,
            tripped: false,
            frame_count: 0,
        }
    }

    /// A monitor that measures but never trips.
    pub fn disabled() -> Self {
        Self::new(0.0, DEFAULT_SAMPLE_INTERVAL)
    }

    /// Account for one frame. Returns the new rate when this frame closed a
    /// sampling window.
    pub fn record_frame(&mut self, frame_time: Duration) -> Option<f32> {
        self.frame_count += 1;
        self.window += frame_time;
        self.window_frames += 1;
        if self.window < self.sample_interval {
            return None;
        }

        let fps = self.window_frames as f32 / self.window.as_secs_f32();
        self.window = Duration::ZERO;
        self.window_frames = 0;
        self.fps = Some(fps);
        if fps < self.min_fps {
            self.tripped = true;
        }
        Some(fps)
    }

    /// Rate of the last complete sampling window.
    #[inline]
    pub fn fps(&self) -> Option<f32> {
        self.fps
    }

    /// Whether a window fell below the floor since the last reset.
    #[inline]
    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    #[inline]
    pub fn min_fps(&self) -> f32 {
        self.min_fps
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Clear the latch and all measurements.
    pub fn reset(&mut self) {
        *self = Self::new(self.min_fps, self.sample_interval);
    }
}
