//! Frame sources: "give me the current pixels of this rectangle".

use std::sync::Arc;

use blackbox_common::error::{BlackboxError, BlackboxResult};
use blackbox_platform::{CaptureRegion, MonitorInfo};

use crate::frame::RawFrame;

pub mod watchdog;
pub mod x11grab;
#[cfg(feature = "xcap")]
pub mod xcap_backend;

pub use watchdog::WatchdogSource;
pub use x11grab::{X11GrabBackend, X11GrabSource};
#[cfg(feature = "xcap")]
pub use xcap_backend::{XcapBackend, XcapSource};

/// Grabs single frames of a screen region.
///
/// Calls must stay well under one frame interval in normal operation.
/// A source may keep a backing buffer between calls and nothing else.
pub trait FrameSource: Send {
    /// Capture the current contents of `region`.
    fn capture(&mut self, region: &CaptureRegion) -> BlackboxResult<RawFrame>;

    /// Hand a frame back so its allocation can be reused.
    fn recycle(&mut self, _frame: RawFrame) {}

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// Platform-specific capture capabilities.
pub trait CaptureBackend: Send + Sync {
    /// Backend name for logging and `--backend` selection.
    fn name(&self) -> &str;

    /// Detect available monitors, in a stable order.
    fn detect_monitors(&self) -> BlackboxResult<Vec<MonitorInfo>>;

    /// Open a frame source that will be polled at `fps`.
    fn open_source(&self, fps: u32) -> BlackboxResult<Box<dyn FrameSource>>;
}

/// Names accepted by [`backend_by_name`].
pub fn available_backends() -> Vec<&'static str> {
    let mut names = vec!["x11grab"];
    if cfg!(feature = "xcap") {
        names.push("xcap");
    }
    names
}

/// Get a capture backend by name.
pub fn backend_by_name(name: &str) -> BlackboxResult<Arc<dyn CaptureBackend>> {
    match name {
        "x11grab" => Ok(Arc::new(X11GrabBackend::new())),
        #[cfg(feature = "xcap")]
        "xcap" => Ok(Arc::new(XcapBackend::new())),
        other => Err(BlackboxError::unsupported(format!(
            "Unknown capture backend '{other}' (available: {})",
            available_backends().join(", ")
        ))),
    }
}
