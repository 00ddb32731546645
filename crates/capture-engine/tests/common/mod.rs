//! Fakes for driving the rotation loop without a display or ffmpeg.
#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use blackbox_capture_engine::encoder::{EncoderFactory, EncoderSettings, SegmentEncoder};
use blackbox_capture_engine::frame::{frame_len, PixelFormat, RawFrame};
use blackbox_capture_engine::source::{CaptureBackend, FrameSource};
use blackbox_capture_engine::{
    RecorderBackends, RecorderEvent, RecordingConfig, SegmentRecorder,
};
use blackbox_common::clock::{Clock, SimulatedClock};
use blackbox_common::config::VideoCodec;
use blackbox_common::error::{BlackboxError, BlackboxResult};
use blackbox_platform::{CaptureRegion, MonitorInfo};

pub fn monitor(width: u32, height: u32) -> MonitorInfo {
    MonitorInfo {
        name: "FAKE-1".to_string(),
        width,
        height,
        x: 0,
        y: 0,
        scale_factor: 1.0,
        refresh_rate_hz: 60,
        primary: true,
    }
}

pub fn config(dir: &Path, segment_secs: u64, fps: u32, cap: usize) -> RecordingConfig {
    RecordingConfig {
        monitor_index: 0,
        fps,
        segment_duration_secs: segment_secs,
        codec: VideoCodec::Xvid,
        output_dir: dir.to_path_buf(),
        retention_cap: cap,
        capture_timeout_ms: 0,
        retry_delay_ms: 500,
    }
}

/// Rendezvous used to pause a fake at a chosen call.
pub struct Gate {
    entered: mpsc::Sender<u64>,
    release: Mutex<mpsc::Receiver<()>>,
}

/// Test-side end of a [`Gate`].
pub struct GateHandle {
    pub entered: mpsc::Receiver<u64>,
    pub release: mpsc::Sender<()>,
}

impl GateHandle {
    pub fn wait_entered(&self) -> u64 {
        self.entered
            .recv_timeout(Duration::from_secs(10))
            .expect("gate was never reached")
    }

    pub fn open(&self) {
        self.release.send(()).expect("gate owner is gone");
    }
}

pub fn gate() -> (Gate, GateHandle) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    (
        Gate {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        },
        GateHandle {
            entered: entered_rx,
            release: release_tx,
        },
    )
}

impl Gate {
    /// Report `call` and block until the test opens the gate.
    pub fn pass(&self, call: u64) {
        let _ = self.entered.send(call);
        let _ = self.release.lock().unwrap().recv();
    }
}

/// Frame source that advances a simulated clock and fails on request.
pub struct ScriptedSource {
    clock: Arc<SimulatedClock>,
    latency: Duration,
    fail_on: Vec<u64>,
    gate: Option<(u64, Gate)>,
    calls: u64,
    spare: Vec<u8>,
}

impl ScriptedSource {
    pub fn new(clock: Arc<SimulatedClock>) -> Self {
        Self {
            clock,
            latency: Duration::ZERO,
            fail_on: Vec::new(),
            gate: None,
            calls: 0,
            spare: Vec::new(),
        }
    }

    /// Each grab takes this long on the simulated clock.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail these 1-based capture calls.
    pub fn fail_on(mut self, calls: &[u64]) -> Self {
        self.fail_on = calls.to_vec();
        self
    }

    /// Block inside capture call `call` until the gate opens.
    pub fn gate_on(mut self, call: u64, gate: Gate) -> Self {
        self.gate = Some((call, gate));
        self
    }
}

impl FrameSource for ScriptedSource {
    fn capture(&mut self, region: &CaptureRegion) -> BlackboxResult<RawFrame> {
        self.calls += 1;
        if let Some((call, gate)) = &self.gate {
            if *call == self.calls {
                gate.pass(self.calls);
            }
        }
        self.clock.advance(self.latency);
        if self.fail_on.contains(&self.calls) {
            return Err(BlackboxError::capture(format!(
                "scripted failure on grab {}",
                self.calls
            )));
        }
        let mut data = std::mem::take(&mut self.spare);
        data.clear();
        data.resize(
            frame_len(region.width(), region.height(), PixelFormat::Bgra),
            self.calls as u8,
        );
        RawFrame::new(region.width(), region.height(), PixelFormat::Bgra, data)
    }

    fn recycle(&mut self, frame: RawFrame) {
        self.spare = frame.data;
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub struct FakeBackend {
    monitors: Mutex<Vec<MonitorInfo>>,
    source: Mutex<Option<ScriptedSource>>,
}

impl FakeBackend {
    pub fn new(monitors: Vec<MonitorInfo>, source: ScriptedSource) -> Arc<Self> {
        Arc::new(Self {
            monitors: Mutex::new(monitors),
            source: Mutex::new(Some(source)),
        })
    }

    pub fn set_monitors(&self, monitors: Vec<MonitorInfo>) {
        *self.monitors.lock().unwrap() = monitors;
    }
}

impl CaptureBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn detect_monitors(&self) -> BlackboxResult<Vec<MonitorInfo>> {
        Ok(self.monitors.lock().unwrap().clone())
    }

    fn open_source(&self, _fps: u32) -> BlackboxResult<Box<dyn FrameSource>> {
        let source = self
            .source
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BlackboxError::capture("scripted source already opened"))?;
        Ok(Box::new(source))
    }
}

pub type WriteHook = Arc<dyn Fn(usize, u64) + Send + Sync>;
pub type FinishHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Writes one byte per frame to a real file so retention has something
/// to prune.
pub struct FakeEncoderFactory {
    input_format: PixelFormat,
    opened: AtomicUsize,
    open_now: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    on_write: Mutex<Option<WriteHook>>,
    on_finish: Mutex<Option<FinishHook>>,
    disk_full_after: Mutex<Option<u64>>,
}

impl FakeEncoderFactory {
    pub fn new(input_format: PixelFormat) -> Arc<Self> {
        Arc::new(Self {
            input_format,
            opened: AtomicUsize::new(0),
            open_now: Arc::new(AtomicUsize::new(0)),
            max_open: Arc::new(AtomicUsize::new(0)),
            on_write: Mutex::new(None),
            on_finish: Mutex::new(None),
            disk_full_after: Mutex::new(None),
        })
    }

    /// Behave like ffmpeg on a full disk: the write after `frames` frames
    /// hits a broken pipe and closing reports the real cause.
    pub fn disk_full_after(&self, frames: u64) {
        *self.disk_full_after.lock().unwrap() = Some(frames);
    }

    /// Called after each frame with `(segment index, frames so far)`.
    pub fn on_write(&self, hook: impl Fn(usize, u64) + Send + Sync + 'static) {
        *self.on_write.lock().unwrap() = Some(Arc::new(hook));
    }

    /// Called when segment `index` is finished.
    pub fn on_finish(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_finish.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Most encoders that were open at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn name(&self) -> &str {
        "fake"
    }

    fn open(
        &self,
        path: &Path,
        settings: &EncoderSettings,
    ) -> BlackboxResult<Box<dyn SegmentEncoder>> {
        let file = File::create(path)?;
        let segment = self.opened.fetch_add(1, Ordering::SeqCst);
        let now_open = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);

        Ok(Box::new(FakeEncoder {
            file,
            segment,
            settings: *settings,
            format: self.input_format,
            frames: 0,
            open_now: Arc::clone(&self.open_now),
            on_write: self.on_write.lock().unwrap().clone(),
            on_finish: self.on_finish.lock().unwrap().clone(),
            disk_full_after: *self.disk_full_after.lock().unwrap(),
            out_of_space: false,
        }))
    }
}

pub struct FakeEncoder {
    file: File,
    segment: usize,
    settings: EncoderSettings,
    format: PixelFormat,
    frames: u64,
    open_now: Arc<AtomicUsize>,
    on_write: Option<WriteHook>,
    on_finish: Option<FinishHook>,
    disk_full_after: Option<u64>,
    out_of_space: bool,
}

impl SegmentEncoder for FakeEncoder {
    fn input_format(&self) -> PixelFormat {
        self.format
    }

    fn write_frame(&mut self, data: &[u8]) -> BlackboxResult<()> {
        let expected = frame_len(self.settings.width, self.settings.height, self.format);
        if data.len() != expected {
            return Err(BlackboxError::encode(format!(
                "got {} bytes, expected {expected}",
                data.len()
            )));
        }
        if self.disk_full_after == Some(self.frames) {
            self.out_of_space = true;
            return Err(BlackboxError::encode(
                "Failed to write frame: Broken pipe (os error 32)",
            ));
        }
        self.file.write_all(&data[..1])?;
        self.frames += 1;
        if let Some(hook) = &self.on_write {
            hook(self.segment, self.frames);
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> BlackboxResult<()> {
        self.file.sync_all()?;
        self.open_now.fetch_sub(1, Ordering::SeqCst);
        if let Some(hook) = &self.on_finish {
            hook(self.segment);
        }
        if self.out_of_space {
            return Err(BlackboxError::resource("Disk full while writing segment"));
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

/// A recorder wired to fakes on a simulated clock.
pub struct Harness {
    pub recorder: SegmentRecorder,
    pub clock: Arc<SimulatedClock>,
    pub backend: Arc<FakeBackend>,
    pub encoders: Arc<FakeEncoderFactory>,
}

impl Harness {
    pub fn new(
        monitors: Vec<MonitorInfo>,
        clock: Arc<SimulatedClock>,
        source: ScriptedSource,
        encoders: Arc<FakeEncoderFactory>,
    ) -> Self {
        blackbox_common::logging::init_default_logging();
        let backend = FakeBackend::new(monitors, source);
        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let recorder = SegmentRecorder::new(RecorderBackends {
            capture: backend.clone(),
            encoders: encoders.clone(),
            clock: clock_dyn,
        });
        Self {
            recorder,
            clock,
            backend,
            encoders,
        }
    }

    /// Stop the recorder from inside the loop once segment `index` is
    /// finished.
    pub fn stop_after_segment(&self, index: usize) {
        let stop = self.recorder.stop_flag();
        self.encoders.on_finish(move |segment| {
            if segment == index {
                stop.store(true, Ordering::SeqCst);
            }
        });
    }
}

pub fn drain_events(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<RecorderEvent>,
) -> Vec<RecorderEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn regular_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
