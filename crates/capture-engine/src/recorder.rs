//! The segment rotation loop.
//!
//! One [`RotationLoop`] runs per recording session on its own thread. Each
//! iteration opens a timestamped segment, fills it with frames at a fixed
//! cadence until the segment duration elapses (or Stop / an error cuts it
//! short), finalizes it, and prunes the output directory. Non-fatal errors
//! end the current segment only; the loop then backs off and opens the next
//! one. Resource errors end the session in [`SessionPhase::Failed`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use blackbox_common::clock::{Clock, FrameScheduler};
use blackbox_common::config::{RecordingDefaults, VideoCodec};
use blackbox_common::error::{BlackboxError, BlackboxResult};
use blackbox_platform::{monitor_list_for_error, CaptureRegion, MonitorInfo};

use crate::encoder::{EncoderFactory, EncoderSettings, SegmentEncoder};
use crate::naming::segment_path;
use crate::retention;
use crate::source::{CaptureBackend, FrameSource};

const BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Parameters of one recording session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingConfig {
    /// Zero-based index into the detected monitor list.
    pub monitor_index: usize,
    pub fps: u32,
    pub segment_duration_secs: u64,
    pub codec: VideoCodec,
    pub output_dir: PathBuf,
    /// Maximum number of regular files kept in `output_dir`.
    pub retention_cap: usize,
    /// Per-frame grab timeout; 0 disables the watchdog.
    pub capture_timeout_ms: u64,
    /// Pause before reopening a segment that ended with an error.
    pub retry_delay_ms: u64,
}

impl RecordingConfig {
    pub fn from_defaults(defaults: &RecordingDefaults) -> Self {
        Self {
            monitor_index: defaults.monitor_index,
            fps: defaults.fps,
            segment_duration_secs: defaults.segment_duration_secs,
            codec: defaults.codec,
            output_dir: defaults.output_dir.clone(),
            retention_cap: defaults.retention_cap,
            capture_timeout_ms: defaults.capture_timeout_ms,
            retry_delay_ms: defaults.retry_delay_ms,
        }
    }

    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs(self.segment_duration_secs)
    }

    pub fn capture_timeout(&self) -> Option<Duration> {
        (self.capture_timeout_ms > 0).then(|| Duration::from_millis(self.capture_timeout_ms))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Check the numeric settings and resolve the monitor to a region.
    pub fn validate(&self, monitors: &[MonitorInfo]) -> BlackboxResult<CaptureRegion> {
        if self.fps == 0 {
            return Err(BlackboxError::config("FPS must be greater than zero"));
        }
        if self.segment_duration_secs == 0 {
            return Err(BlackboxError::config(
                "Segment duration must be greater than zero",
            ));
        }
        if self.retention_cap == 0 {
            return Err(BlackboxError::config(
                "Retention cap must keep at least one file",
            ));
        }
        let monitor = monitors
            .get(self.monitor_index)
            .ok_or_else(|| BlackboxError::config(invalid_index(monitors, self.monitor_index)))?;
        CaptureRegion::from_monitor(monitor)
    }
}

fn invalid_index(monitors: &[MonitorInfo], index: usize) -> String {
    format!(
        "Invalid monitor index {index}; available: {}",
        monitor_list_for_error(monitors)
    )
}

/// Re-resolve the region at a segment boundary. A monitor that went away
/// is a capture error here, not a config error.
fn resolve_region(monitors: &[MonitorInfo], index: usize) -> BlackboxResult<CaptureRegion> {
    let monitor = monitors
        .get(index)
        .ok_or_else(|| BlackboxError::capture(invalid_index(monitors, index)))?;
    CaptureRegion::from_monitor(monitor)
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Starting,
    Capturing,
    Finalizing,
    Stopped,
    Failed,
}

impl SessionPhase {
    /// True while a loop thread owns the session.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Capturing | Self::Finalizing)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Capturing => "capturing",
            Self::Finalizing => "finalizing",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a session, published through a watch channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub phase: SessionPhase,
    /// Seconds left in the current segment.
    pub remaining_secs: f64,
    pub last_error: Option<String>,
    pub current_segment: Option<String>,
    pub segments_completed: u64,
    pub last_saved: Option<String>,
    pub stop_requested: bool,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stop_requested && self.phase.is_active() {
            return f.write_str("Stopping recording...");
        }
        match self.phase {
            SessionPhase::Idle => f.write_str("Idle"),
            SessionPhase::Starting => f.write_str("Recording in progress..."),
            SessionPhase::Capturing => {
                write!(f, "Recording... Remaining: {:.2}s", self.remaining_secs)
            }
            SessionPhase::Finalizing => match &self.current_segment {
                Some(name) => write!(f, "Saving {name}..."),
                None => f.write_str("Saving segment..."),
            },
            SessionPhase::Stopped => match &self.last_saved {
                Some(name) => write!(f, "Recording saved: {name}"),
                None => f.write_str("Recording stopped"),
            },
            SessionPhase::Failed => write!(
                f,
                "Error: {}",
                self.last_error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Notifications for whoever presents the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RecorderEvent {
    /// A segment file was finalized.
    SegmentCreated {
        file_name: String,
        frames: u64,
        ended_early: bool,
    },
    /// Retention removed these files, oldest first.
    FilesDeleted { files: Vec<String> },
    /// A segment ended with an error, or could not be opened at all.
    SegmentError {
        file_name: Option<String>,
        message: String,
    },
}

/// Outcome of one finalized segment.
#[derive(Debug, Clone)]
pub struct SegmentReport {
    pub file_name: String,
    pub path: PathBuf,
    pub started_at: DateTime<Local>,
    pub frames: u64,
    pub ended_early: bool,
    pub error: Option<String>,
}

/// Returned by [`crate::SegmentRecorder::wait`] once the loop exits.
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub segments: Vec<SegmentReport>,
    pub deleted: Vec<String>,
    pub final_phase: SessionPhase,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct FileHistory {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
}

/// State shared between the controller and the loop thread.
pub(crate) struct SessionShared {
    pub stop_flag: Arc<AtomicBool>,
    pub status: watch::Sender<StatusSnapshot>,
    pub history: RwLock<FileHistory>,
    pub events: mpsc::UnboundedSender<RecorderEvent>,
}

impl SessionShared {
    pub fn publish(&self, update: impl FnOnce(&mut StatusSnapshot)) {
        self.status.send_modify(update);
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    fn emit(&self, event: RecorderEvent) {
        // The receiver may have been dropped by a caller that only polls status.
        let _ = self.events.send(event);
    }

    fn record_created(&self, file_name: &str) {
        self.history
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .created
            .push(file_name.to_string());
    }

    fn record_deleted(&self, names: &[String]) {
        self.history
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .deleted
            .extend_from_slice(names);
    }
}

pub(crate) struct RotationLoop {
    pub config: RecordingConfig,
    pub backend: Arc<dyn CaptureBackend>,
    pub source: Box<dyn FrameSource>,
    pub encoders: Arc<dyn EncoderFactory>,
    pub clock: Arc<dyn Clock>,
    pub shared: Arc<SessionShared>,
}

impl RotationLoop {
    /// Run until Stop or a fatal error. Publishes the terminal phase.
    pub fn run(mut self) -> SessionSummary {
        let mut summary = SessionSummary::default();
        tracing::info!(
            dir = %self.config.output_dir.display(),
            monitor = self.config.monitor_index,
            fps = self.config.fps,
            segment_secs = self.config.segment_duration_secs,
            codec = %self.config.codec,
            cap = self.config.retention_cap,
            source = self.source.name(),
            encoder = self.encoders.name(),
            "Rotation loop started"
        );

        match self.rotate(&mut summary) {
            Ok(()) => {
                summary.final_phase = SessionPhase::Stopped;
                self.shared.publish(|s| {
                    s.phase = SessionPhase::Stopped;
                    s.current_segment = None;
                    s.remaining_secs = 0.0;
                });
                tracing::info!(segments = summary.segments.len(), "Recording stopped");
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(error = %message, "Recording failed");
                summary.final_phase = SessionPhase::Failed;
                summary.error = Some(message.clone());
                self.shared.publish(|s| {
                    s.phase = SessionPhase::Failed;
                    s.current_segment = None;
                    s.last_error = Some(message);
                });
            }
        }
        summary
    }

    fn rotate(&mut self, summary: &mut SessionSummary) -> BlackboxResult<()> {
        ensure_output_dir(&self.config.output_dir)?;

        // The first segment always opens, even if Stop is already pending.
        loop {
            let errored = self.record_segment(summary)?;
            if self.shared.stop_requested() {
                return Ok(());
            }
            if errored {
                self.back_off();
                if self.shared.stop_requested() {
                    return Ok(());
                }
            }
            tracing::debug!("Opening next segment");
        }
    }

    /// Record, finalize and prune one segment. Returns whether it ended
    /// with a (non-fatal) error.
    fn record_segment(&mut self, summary: &mut SessionSummary) -> BlackboxResult<bool> {
        let region = match self
            .backend
            .detect_monitors()
            .and_then(|monitors| resolve_region(&monitors, self.config.monitor_index))
        {
            Ok(region) => region,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.segment_error(None, &e);
                return Ok(true);
            }
        };

        let started_at = self.clock.wall_now();
        let path = segment_path(&self.config.output_dir, &started_at, self.config.codec);
        let file_name = file_name_of(&path);
        let settings = EncoderSettings {
            width: region.width(),
            height: region.height(),
            fps: self.config.fps,
            codec: self.config.codec,
        };

        let mut encoder = match self.encoders.open(&path, &settings) {
            Ok(encoder) => encoder,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.segment_error(Some(&file_name), &e);
                return Ok(true);
            }
        };

        tracing::info!(file = %file_name, %region, "Segment opened");
        let duration = self.config.segment_duration();
        self.shared.publish(|s| {
            s.phase = SessionPhase::Capturing;
            s.current_segment = Some(file_name.clone());
            s.remaining_secs = duration.as_secs_f64();
        });

        let segment_start = self.clock.now();
        let scheduler = FrameScheduler::new(segment_start, self.config.fps);
        let segment_end = segment_start + duration;
        let captured = self.capture_frames(encoder.as_mut(), &region, &scheduler, segment_end);

        self.shared.publish(|s| s.phase = SessionPhase::Finalizing);
        let frames = encoder.frames_written();
        let finished = encoder.finish();

        let (ended_early, error) = match (captured, finished) {
            (Ok(stopped_early), Ok(())) => (stopped_early, None),
            (Ok(_), Err(e)) => (true, Some(e)),
            // A dead encoder usually surfaces first as a broken pipe on write;
            // the real cause (disk full) only shows up when it is closed.
            (Err(e), Err(close_err)) if close_err.is_fatal() => {
                tracing::warn!(file = %file_name, error = %e, "Frame write failed before encoder shut down");
                (true, Some(close_err))
            }
            (Err(e), finished) => {
                if let Err(close_err) = finished {
                    tracing::warn!(file = %file_name, error = %close_err, "Encoder also failed to close");
                }
                (true, Some(e))
            }
        };

        if path.exists() {
            self.shared.record_created(&file_name);
            self.shared.emit(RecorderEvent::SegmentCreated {
                file_name: file_name.clone(),
                frames,
                ended_early,
            });
            self.shared.publish(|s| {
                s.segments_completed += 1;
                s.last_saved = Some(file_name.clone());
            });
            tracing::info!(file = %file_name, frames, ended_early, "Segment finalized");
        } else {
            tracing::warn!(file = %file_name, "Encoder left no file behind");
        }
        if let Some(e) = &error {
            self.segment_error(Some(&file_name), e);
        }

        summary.segments.push(SegmentReport {
            file_name,
            path,
            started_at,
            frames,
            ended_early,
            error: error.as_ref().map(ToString::to_string),
        });

        let pruned = self.prune(summary);
        let errored = error.is_some();
        match error {
            Some(e) if e.is_fatal() => Err(e),
            _ => pruned.map(|()| errored),
        }
    }

    /// Fill one segment. Returns `true` if Stop cut it short.
    fn capture_frames(
        &mut self,
        encoder: &mut dyn SegmentEncoder,
        region: &CaptureRegion,
        scheduler: &FrameScheduler,
        segment_end: Duration,
    ) -> BlackboxResult<bool> {
        let target = encoder.input_format();
        let mut converted = Vec::new();

        loop {
            let now = self.clock.now();
            if self.shared.stop_requested() {
                return Ok(now < segment_end);
            }
            if now >= segment_end {
                return Ok(false);
            }

            let frame = self.source.capture(region)?;
            if frame.width != region.width() || frame.height != region.height() {
                let err = BlackboxError::capture(format!(
                    "Frame is {}x{}, expected {}x{}",
                    frame.width,
                    frame.height,
                    region.width(),
                    region.height()
                ));
                self.source.recycle(frame);
                return Err(err);
            }

            let written = if frame.format == target {
                encoder.write_frame(&frame.data)
            } else {
                frame.convert_into(target, &mut converted);
                encoder.write_frame(&converted)
            };
            self.source.recycle(frame);
            written?;

            let now = self.clock.now();
            let remaining = segment_end.saturating_sub(now);
            self.shared
                .publish(|s| s.remaining_secs = remaining.as_secs_f64());

            let delay = scheduler
                .delay_until_next(encoder.frames_written(), now)
                .min(remaining);
            if !delay.is_zero() {
                self.clock.sleep(delay);
            }
        }
    }

    fn prune(&self, summary: &mut SessionSummary) -> BlackboxResult<()> {
        let removed = retention::enforce(&self.config.output_dir, self.config.retention_cap)?;
        if !removed.is_empty() {
            self.shared.record_deleted(&removed);
            summary.deleted.extend_from_slice(&removed);
            self.shared.emit(RecorderEvent::FilesDeleted { files: removed });
        }
        Ok(())
    }

    fn segment_error(&self, file_name: Option<&str>, error: &BlackboxError) {
        let message = error.to_string();
        tracing::warn!(file = ?file_name, error = %message, "Segment ended with error");
        self.shared.publish(|s| s.last_error = Some(message.clone()));
        self.shared.emit(RecorderEvent::SegmentError {
            file_name: file_name.map(str::to_string),
            message,
        });
    }

    /// Wait out the retry delay in short steps so Stop stays responsive.
    fn back_off(&self) {
        let mut left = self.config.retry_delay();
        while !left.is_zero() && !self.shared.stop_requested() {
            let step = left.min(BACKOFF_STEP);
            self.clock.sleep(step);
            left -= step;
        }
    }
}

fn ensure_output_dir(dir: &Path) -> BlackboxResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        BlackboxError::resource(format!(
            "Cannot create output directory {}: {e}",
            dir.display()
        ))
    })
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
