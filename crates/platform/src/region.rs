//! Capture regions.

use std::fmt;

use blackbox_common::error::{BlackboxError, BlackboxResult};
use serde::{Deserialize, Serialize};

use crate::display::MonitorInfo;

/// A rectangle of the virtual desktop, in physical pixels.
///
/// Origins may be negative (monitors left of or above the primary one);
/// sizes are always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureRegion {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl CaptureRegion {
    /// Build a region, rejecting empty rectangles and ones whose far edge
    /// does not fit in `i32` coordinates.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> BlackboxResult<Self> {
        if width == 0 || height == 0 {
            return Err(BlackboxError::config(format!(
                "Invalid capture region {width}x{height} at ({x},{y})"
            )));
        }
        let w = i32::try_from(width)
            .map_err(|_| BlackboxError::config(format!("Capture width too large: {width}")))?;
        let h = i32::try_from(height)
            .map_err(|_| BlackboxError::config(format!("Capture height too large: {height}")))?;
        x.checked_add(w)
            .and_then(|_| y.checked_add(h))
            .ok_or_else(|| BlackboxError::config("Capture region overflows desktop coordinates"))?;
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// The full area of a detected monitor.
    pub fn from_monitor(monitor: &MonitorInfo) -> BlackboxResult<Self> {
        Self::new(monitor.x, monitor.y, monitor.width, monitor.height)
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels covered.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether `self` lies entirely inside `other`.
    pub fn is_within(&self, other: &CaptureRegion) -> bool {
        let right = self.x as i64 + self.width as i64;
        let bottom = self.y as i64 + self.height as i64;
        self.x >= other.x
            && self.y >= other.y
            && right <= other.x as i64 + other.width as i64
            && bottom <= other.y as i64 + other.height as i64
    }
}

impl fmt::Display for CaptureRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ({}, {})", self.width, self.height, self.x, self.y)
    }
}
