//! Display/monitor detection.

use std::fmt;
use std::process::Command;

use blackbox_common::error::{BlackboxError, BlackboxResult};
use serde::{Deserialize, Serialize};

/// Information about a connected monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorInfo {
    /// Monitor name/identifier.
    pub name: String,

    /// Resolution in physical pixels.
    pub width: u32,
    pub height: u32,

    /// Position in the virtual desktop (pixels).
    pub x: i32,
    pub y: i32,

    /// Scale factor (e.g., 1.0, 1.25, 2.0).
    pub scale_factor: f64,

    /// Refresh rate in Hz, 0 when unknown.
    pub refresh_rate_hz: u32,

    /// Whether this is the primary monitor.
    pub primary: bool,
}

impl MonitorInfo {
    /// Human-readable label for monitor `index` (zero-based), numbered
    /// from 1 the way users count screens.
    pub fn label(&self, index: usize) -> String {
        format!(
            "Monitor {}: {}x{} ({}, {})",
            index + 1,
            self.width,
            self.height,
            self.x,
            self.y
        )
    }
}

/// Display server type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayServer {
    Wayland,
    X11,
    #[default]
    Unknown,
}

impl fmt::Display for DisplayServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayServer::Wayland => f.write_str("Wayland"),
            DisplayServer::X11 => f.write_str("X11"),
            DisplayServer::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Detect the current display server.
pub fn detect_display_server() -> DisplayServer {
    if std::env::var("WAYLAND_DISPLAY").is_ok() {
        DisplayServer::Wayland
    } else if std::env::var("DISPLAY").is_ok() {
        DisplayServer::X11
    } else {
        DisplayServer::Unknown
    }
}

/// The X11 display name to capture from (`$DISPLAY`, default `:0`).
pub fn x11_display_name() -> String {
    std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string())
}

/// Detect connected monitors through `xrandr --listmonitors`.
///
/// Under XWayland this reports the compositor's outputs as well.
pub fn detect_monitors() -> BlackboxResult<Vec<MonitorInfo>> {
    tracing::debug!("Detecting monitors via xrandr");

    let output = Command::new("xrandr")
        .arg("--listmonitors")
        .output()
        .map_err(|e| BlackboxError::platform(format!("Failed to run xrandr: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BlackboxError::platform(format!(
            "xrandr --listmonitors failed: {}",
            stderr.trim()
        )));
    }

    let monitors = parse_xrandr_monitors(&String::from_utf8_lossy(&output.stdout));
    tracing::debug!(count = monitors.len(), "Monitors detected");
    Ok(monitors)
}

/// Parse `xrandr --listmonitors` output.
///
/// ```text
/// Monitors: 2
///  0: +*DP-1 2560/597x1440/336+0+0  DP-1
///  1: +HDMI-1 1920/531x1080/299+-1920+0  HDMI-1
/// ```
pub fn parse_xrandr_monitors(text: &str) -> Vec<MonitorInfo> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let index = parts.next()?;
            if !index.ends_with(':') {
                return None;
            }
            let flagged_name = parts.next()?;
            let geometry = parts.next()?;
            let primary = flagged_name.contains('*');
            let name = flagged_name.trim_start_matches(['+', '*']).to_string();
            let (width, height, x, y) = parse_geometry(geometry)?;
            Some(MonitorInfo {
                name,
                width,
                height,
                x,
                y,
                scale_factor: 1.0,
                refresh_rate_hz: 0,
                primary,
            })
        })
        .collect()
}

/// Parse `W/mmWxH/mmH+X+Y` where X and Y may be negative (`+-1920`).
fn parse_geometry(geometry: &str) -> Option<(u32, u32, i32, i32)> {
    let (dims, position) = geometry.split_once('+')?;
    let (w, h) = dims.split_once('x')?;
    let width = w.split('/').next()?.parse().ok()?;
    let height = h.split('/').next()?.parse().ok()?;
    let (x, y) = position.split_once('+')?;
    Some((width, height, x.parse().ok()?, y.parse().ok()?))
}

/// Render a monitor list for error messages.
pub fn monitor_list_for_error(monitors: &[MonitorInfo]) -> String {
    if monitors.is_empty() {
        return "none".to_string();
    }
    monitors
        .iter()
        .enumerate()
        .map(|(idx, monitor)| {
            format!(
                "{idx}:{}({}x{}@{},{}{})",
                monitor.name,
                monitor.width,
                monitor.height,
                monitor.x,
                monitor.y,
                if monitor.primary { ",primary" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
