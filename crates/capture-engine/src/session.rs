//! Recording session control.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

use tokio::sync::{mpsc, watch};

use blackbox_common::clock::{Clock, SystemClock};
use blackbox_common::error::{BlackboxError, BlackboxResult};

use crate::encoder::EncoderFactory;
use crate::recorder::{
    FileHistory, RecorderEvent, RecordingConfig, RotationLoop, SessionPhase, SessionShared,
    SessionSummary, StatusSnapshot,
};
use crate::source::{CaptureBackend, FrameSource, WatchdogSource};

/// The capabilities a recorder is built from.
#[derive(Clone)]
pub struct RecorderBackends {
    pub capture: Arc<dyn CaptureBackend>,
    pub encoders: Arc<dyn EncoderFactory>,
    pub clock: Arc<dyn Clock>,
}

impl RecorderBackends {
    /// Real backends on the wall clock.
    pub fn system(capture: Arc<dyn CaptureBackend>, encoders: Arc<dyn EncoderFactory>) -> Self {
        Self {
            capture,
            encoders,
            clock: Arc::new(SystemClock::start()),
        }
    }
}

/// Controller for the rolling recorder.
///
/// `start` validates the configuration and launches the rotation loop on a
/// `segment-recorder` thread; everything else is a non-blocking read of
/// state the loop publishes, except [`SegmentRecorder::wait`].
pub struct SegmentRecorder {
    backends: RecorderBackends,
    shared: Arc<SessionShared>,
    events: Option<mpsc::UnboundedReceiver<RecorderEvent>>,
    worker: Option<JoinHandle<SessionSummary>>,
}

impl SegmentRecorder {
    pub fn new(backends: RecorderBackends) -> Self {
        let (status, _) = watch::channel(StatusSnapshot::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backends,
            shared: Arc::new(SessionShared {
                stop_flag: Arc::new(AtomicBool::new(false)),
                status,
                history: RwLock::new(FileHistory::default()),
                events: events_tx,
            }),
            events: Some(events_rx),
            worker: None,
        }
    }

    /// Validate `config` and start recording.
    ///
    /// Fails without launching anything if a session is already running,
    /// the configuration is invalid, or the frame source cannot be opened.
    pub fn start(&mut self, config: RecordingConfig) -> BlackboxResult<()> {
        if self.is_running() {
            return Err(BlackboxError::session("A recording session is already running"));
        }
        if let Some(previous) = self.worker.take() {
            let _ = previous.join();
        }

        let monitors = self.backends.capture.detect_monitors()?;
        let region = config.validate(&monitors)?;

        tracing::info!(
            backend = self.backends.capture.name(),
            monitor = config.monitor_index,
            %region,
            "Starting recording session"
        );

        self.shared.stop_flag.store(false, Ordering::SeqCst);
        *self.shared.history.write().unwrap_or_else(|e| e.into_inner()) = FileHistory::default();
        let duration = config.segment_duration().as_secs_f64();
        self.shared.status.send_replace(StatusSnapshot {
            phase: SessionPhase::Starting,
            remaining_secs: duration,
            ..Default::default()
        });

        let source = match self.open_source(&config) {
            Ok(source) => source,
            Err(e) => {
                self.fail_start(&e);
                return Err(e);
            }
        };

        let rotation = RotationLoop {
            config,
            backend: Arc::clone(&self.backends.capture),
            source,
            encoders: Arc::clone(&self.backends.encoders),
            clock: Arc::clone(&self.backends.clock),
            shared: Arc::clone(&self.shared),
        };

        let handle = std::thread::Builder::new()
            .name("segment-recorder".to_string())
            .spawn(move || rotation.run())
            .map_err(|e| {
                let err = BlackboxError::resource(format!("Failed to spawn recorder thread: {e}"));
                self.fail_start(&err);
                err
            })?;
        self.worker = Some(handle);
        Ok(())
    }

    fn open_source(&self, config: &RecordingConfig) -> BlackboxResult<Box<dyn FrameSource>> {
        let source = self.backends.capture.open_source(config.fps)?;
        match config.capture_timeout() {
            Some(timeout) => Ok(Box::new(WatchdogSource::new(source, timeout)?)),
            None => Ok(source),
        }
    }

    fn fail_start(&self, error: &BlackboxError) {
        let message = error.to_string();
        self.shared.publish(|s| {
            s.phase = SessionPhase::Failed;
            s.last_error = Some(message);
        });
    }

    /// Ask the loop to finish the current frame, finalize the segment and
    /// exit. Idempotent; returns immediately.
    pub fn stop(&self) {
        if !self.shared.stop_flag.swap(true, Ordering::SeqCst) {
            tracing::info!("Stop requested");
        }
        self.shared.publish(|s| {
            if s.phase.is_active() {
                s.stop_requested = true;
            }
        });
    }

    /// Shared stop flag, for wiring into signal handlers.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.stop_flag)
    }

    pub fn status(&self) -> StatusSnapshot {
        self.shared.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.shared.status.subscribe()
    }

    /// Event stream. Only the first call gets the receiver.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<RecorderEvent>> {
        self.events.take()
    }

    /// Segment files finalized in the current (or last) session.
    pub fn created_files(&self) -> Vec<String> {
        self.shared
            .history
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .created
            .clone()
    }

    /// Files removed by retention in the current (or last) session.
    pub fn deleted_files(&self) -> Vec<String> {
        self.shared
            .history
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .deleted
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Block until the loop thread exits. `None` if no session was started
    /// or the thread panicked.
    pub fn wait(&mut self) -> Option<SessionSummary> {
        let handle = self.worker.take()?;
        match handle.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                tracing::error!("Recorder thread panicked");
                self.fail_start(&BlackboxError::session("Recorder thread panicked"));
                None
            }
        }
    }
}

impl Drop for SegmentRecorder {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
            let _ = self.wait();
        }
    }
}
