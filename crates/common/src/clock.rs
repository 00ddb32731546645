//! Clock and timing utilities for the recording loop.
//!
//! Every segment is timed against a monotonic clock. This module provides:
//! - The [`Clock`] abstraction with a real and a simulated implementation
//! - The [`FrameScheduler`] that computes absolute frame boundaries so
//!   encode latency never accumulates into drift

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};

/// Source of time for the recorder.
pub trait Clock: Send + Sync {
    /// Monotonic time elapsed since the clock's epoch.
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Local wall-clock time, used for segment file names.
    fn wall_now(&self) -> DateTime<Local>;
}

/// A clock backed by [`Instant`] and the system wall clock.
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::start()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    fn wall_now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A manually driven clock. Sleeping advances time instantly, which lets
/// tests run hours of simulated recording in milliseconds.
#[derive(Debug)]
pub struct SimulatedClock {
    elapsed_ns: AtomicU64,
    wall_epoch: DateTime<Local>,
}

impl SimulatedClock {
    /// Create a simulated clock whose wall time starts at `wall_epoch`.
    pub fn starting_at(wall_epoch: DateTime<Local>) -> Self {
        Self {
            elapsed_ns: AtomicU64::new(0),
            wall_epoch,
        }
    }

    /// Move time forward without sleeping (simulates work taking time).
    pub fn advance(&self, duration: Duration) {
        self.elapsed_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        // 2026-01-01T00:00:00Z
        let utc = DateTime::<Utc>::from_timestamp(1_767_225_600, 0).unwrap_or_default();
        Self::starting_at(utc.with_timezone(&Local))
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    fn wall_now(&self) -> DateTime<Local> {
        let elapsed =
            chrono::Duration::from_std(self.now()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_epoch + elapsed
    }
}

/// Fixed-cadence frame scheduler.
///
/// Frame `n` of a segment is due at `start + n / fps`. Waiting for the
/// next absolute boundary (instead of sleeping `1 / fps` after each frame)
/// keeps slow frames from pushing every later frame back.
#[derive(Debug, Clone, Copy)]
pub struct FrameScheduler {
    start: Duration,
    fps: u32,
}

impl FrameScheduler {
    /// Create a scheduler for a segment starting at `start` (clock time).
    pub fn new(start: Duration, fps: u32) -> Self {
        Self {
            start,
            fps: fps.max(1),
        }
    }

    /// Clock time at which frame `index` is due.
    pub fn frame_deadline(&self, index: u64) -> Duration {
        let offset_ns = index as u128 * 1_000_000_000 / self.fps as u128;
        self.start + Duration::from_nanos(offset_ns as u64)
    }

    /// How long to sleep after `frames_written` frames, clamped at zero
    /// when the loop is running behind.
    pub fn delay_until_next(&self, frames_written: u64, now: Duration) -> Duration {
        self.frame_deadline(frames_written + 1).saturating_sub(now)
    }
}
