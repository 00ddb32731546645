//! X11 capture through an `ffmpeg -f x11grab` child process.
//!
//! One grabber process streams raw BGRA frames for the active region;
//! each [`FrameSource::capture`] call reads exactly one frame from its
//! stdout. The grabber paces itself at the requested frame rate and blocks
//! on a full pipe, so at most one frame of latency builds up.

use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};

use blackbox_common::error::{BlackboxError, BlackboxResult};
use blackbox_platform::{detect_monitors, x11_display_name, CaptureRegion, MonitorInfo};

use crate::frame::{frame_len, PixelFormat, RawFrame};
use crate::source::{CaptureBackend, FrameSource};

pub struct X11GrabBackend {
    display: String,
}

impl X11GrabBackend {
    pub fn new() -> Self {
        Self {
            display: x11_display_name(),
        }
    }
}

impl Default for X11GrabBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for X11GrabBackend {
    fn name(&self) -> &str {
        "x11grab"
    }

    fn detect_monitors(&self) -> BlackboxResult<Vec<MonitorInfo>> {
        detect_monitors()
    }

    fn open_source(&self, fps: u32) -> BlackboxResult<Box<dyn FrameSource>> {
        Ok(Box::new(X11GrabSource::new(self.display.clone(), fps)))
    }
}

struct Grabber {
    region: CaptureRegion,
    child: Child,
    stdout: ChildStdout,
}

impl Grabber {
    fn spawn(display: &str, fps: u32, region: &CaptureRegion) -> BlackboxResult<Self> {
        let input = format!("{display}+{},{}", region.x(), region.y());
        tracing::debug!(%region, input = %input, fps, "Spawning x11grab process");

        let mut child = Command::new("ffmpeg")
            .args(grab_args(&input, fps, region))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    BlackboxError::capture("ffmpeg was not found on PATH; install ffmpeg to capture")
                } else {
                    BlackboxError::capture(format!("Failed to spawn x11grab process: {e}"))
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BlackboxError::capture("Failed to capture x11grab stdout"))?;

        Ok(Self {
            region: *region,
            child,
            stdout,
        })
    }

    fn shutdown(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn grab_args(input: &str, fps: u32, region: &CaptureRegion) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "x11grab".into(),
        "-draw_mouse".into(),
        "1".into(),
        "-framerate".into(),
        fps.max(1).to_string(),
        "-video_size".into(),
        format!("{}x{}", region.width(), region.height()),
        "-i".into(),
        input.to_string(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        PixelFormat::Bgra.ffmpeg_name().into(),
        "pipe:1".into(),
    ]
}

/// Frame source backed by a long-lived x11grab process.
pub struct X11GrabSource {
    display: String,
    fps: u32,
    grabber: Option<Grabber>,
    spare: Vec<u8>,
}

impl X11GrabSource {
    pub fn new(display: String, fps: u32) -> Self {
        Self {
            display,
            fps,
            grabber: None,
            spare: Vec::new(),
        }
    }

    fn grabber_for(&mut self, region: &CaptureRegion) -> BlackboxResult<&mut Grabber> {
        if self.grabber.as_ref().is_some_and(|g| g.region != *region) {
            if let Some(old) = self.grabber.take() {
                tracing::debug!(old = %old.region, new = %region, "Capture region changed; restarting grabber");
                old.shutdown();
            }
        }
        if self.grabber.is_none() {
            self.grabber = Some(Grabber::spawn(&self.display, self.fps, region)?);
        }
        self.grabber
            .as_mut()
            .ok_or_else(|| BlackboxError::capture("x11grab process unavailable"))
    }
}

impl FrameSource for X11GrabSource {
    fn capture(&mut self, region: &CaptureRegion) -> BlackboxResult<RawFrame> {
        let len = frame_len(region.width(), region.height(), PixelFormat::Bgra);
        let mut buf = std::mem::take(&mut self.spare);
        buf.resize(len, 0);

        let grabber = self.grabber_for(region)?;
        match grabber.stdout.read_exact(&mut buf) {
            Ok(()) => RawFrame::new(region.width(), region.height(), PixelFormat::Bgra, buf),
            Err(e) => {
                // The grabber exits when the display or region goes away.
                if let Some(dead) = self.grabber.take() {
                    dead.shutdown();
                }
                Err(BlackboxError::capture(format!(
                    "x11grab stream ended for {region}: {e}"
                )))
            }
        }
    }

    fn recycle(&mut self, frame: RawFrame) {
        self.spare = frame.data;
    }

    fn name(&self) -> &str {
        "x11grab"
    }
}

impl Drop for X11GrabSource {
    fn drop(&mut self) {
        if let Some(grabber) = self.grabber.take() {
            grabber.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grab_args_describe_region_and_format() {
        let region = CaptureRegion::new(2560, 0, 1920, 1080).unwrap();
        let args = grab_args(":1+2560,0", 15, &region);
        let joined = args.join(" ");
        assert!(joined.contains("-f x11grab"));
        assert!(joined.contains("-video_size 1920x1080"));
        assert!(joined.contains("-i :1+2560,0"));
        assert!(joined.contains("-framerate 15"));
        assert!(joined.ends_with("-pix_fmt bgra pipe:1"));
    }
}
