//! Blackbox platform contracts.
//!
//! Cross-platform display data structures used by the capture engine and
//! the CLI, plus the Linux-side monitor discovery:
//! - **Monitors:** [`MonitorInfo`] and enumeration via `xrandr`
//! - **Regions:** [`CaptureRegion`], the validated rectangle a segment records
//! - **Display server:** Wayland / X11 detection

pub mod display;
pub mod region;

pub use display::*;
pub use region::*;
