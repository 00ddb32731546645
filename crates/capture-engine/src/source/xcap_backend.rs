//! Cross-platform screen capture using the xcap library.

use blackbox_common::error::{BlackboxError, BlackboxResult};
use blackbox_platform::{CaptureRegion, MonitorInfo};
use xcap::Monitor;

use crate::frame::{PixelFormat, RawFrame};
use crate::source::{CaptureBackend, FrameSource};

pub struct XcapBackend;

impl XcapBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for XcapBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn all_monitors() -> BlackboxResult<Vec<Monitor>> {
    Monitor::all().map_err(|e| BlackboxError::platform(format!("Monitor::all failed: {e}")))
}

fn monitor_region(monitor: &Monitor) -> Option<CaptureRegion> {
    CaptureRegion::new(
        monitor.x().ok()?,
        monitor.y().ok()?,
        monitor.width().ok()?,
        monitor.height().ok()?,
    )
    .ok()
}

impl CaptureBackend for XcapBackend {
    fn name(&self) -> &str {
        "xcap"
    }

    fn detect_monitors(&self) -> BlackboxResult<Vec<MonitorInfo>> {
        let monitors = all_monitors()?;
        Ok(monitors
            .iter()
            .enumerate()
            .map(|(index, monitor)| MonitorInfo {
                name: monitor
                    .name()
                    .unwrap_or_else(|_| format!("Display {index}")),
                width: monitor.width().unwrap_or(0),
                height: monitor.height().unwrap_or(0),
                x: monitor.x().unwrap_or(0),
                y: monitor.y().unwrap_or(0),
                scale_factor: monitor.scale_factor().map(f64::from).unwrap_or(1.0),
                refresh_rate_hz: monitor.frequency().map(|hz| hz.round() as u32).unwrap_or(0),
                primary: monitor.is_primary().unwrap_or(false),
            })
            .collect())
    }

    fn open_source(&self, _fps: u32) -> BlackboxResult<Box<dyn FrameSource>> {
        Ok(Box::new(XcapSource::new()))
    }
}

/// Grabs the monitor that contains the requested region and crops to it.
pub struct XcapSource {
    spare: Vec<u8>,
}

impl XcapSource {
    pub fn new() -> Self {
        Self { spare: Vec::new() }
    }
}

impl Default for XcapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for XcapSource {
    fn capture(&mut self, region: &CaptureRegion) -> BlackboxResult<RawFrame> {
        let (monitor, bounds) = all_monitors()?
            .into_iter()
            .find_map(|m| {
                let bounds = monitor_region(&m)?;
                region.is_within(&bounds).then_some((m, bounds))
            })
            .ok_or_else(|| BlackboxError::capture(format!("No monitor contains region {region}")))?;

        let image = monitor
            .capture_image()
            .map_err(|e| BlackboxError::capture(format!("capture_image failed: {e}")))?;
        let (img_w, img_h) = (image.width(), image.height());
        let pixels = image.into_raw();

        if bounds.width() == region.width() && bounds.height() == region.height() {
            return RawFrame::new(img_w, img_h, PixelFormat::Rgba, pixels);
        }

        // Crop rows out of the monitor image.
        let stride = img_w as usize * 4;
        let left = (region.x() - bounds.x()) as usize * 4;
        let top = (region.y() - bounds.y()) as usize;
        let row_len = region.width() as usize * 4;
        let mut out = std::mem::take(&mut self.spare);
        out.clear();
        for row in top..top + region.height() as usize {
            let start = row * stride + left;
            let slice = pixels.get(start..start + row_len).ok_or_else(|| {
                BlackboxError::capture(format!(
                    "Monitor image {img_w}x{img_h} is smaller than region {region}"
                ))
            })?;
            out.extend_from_slice(slice);
        }
        RawFrame::new(region.width(), region.height(), PixelFormat::Rgba, out)
    }

    fn recycle(&mut self, frame: RawFrame) {
        self.spare = frame.data;
    }

    fn name(&self) -> &str {
        "xcap"
    }
}
