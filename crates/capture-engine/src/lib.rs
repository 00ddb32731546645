//! Blackbox Capture Engine
//!
//! Rolling screen recorder: captures one monitor into back-to-back
//! fixed-length video segments and keeps only the newest N on disk.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ SegmentRecorder (controller: start / stop / status)  │
//! └───────────────┬──────────────────────────────────────┘
//!                 │ spawns "segment-recorder" thread
//!                 ▼
//! ┌──────────────────────────────────────────────────────┐
//! │ RotationLoop                                         │
//! │  ┌─────────────┐  ┌───────────────┐  ┌────────────┐  │
//! │  │ FrameSource │─▶│ SegmentEncoder│─▶│ recording_ │  │
//! │  │ (watchdog)  │  │ ffmpeg / gst  │  │ *.avi/.mkv │  │
//! │  └─────────────┘  └───────────────┘  └─────┬──────┘  │
//! │                                            ▼         │
//! │                                  Retention (prune)   │
//! └───────────────┬──────────────────────────────────────┘
//!                 │ watch: StatusSnapshot   mpsc: RecorderEvent
//!                 ▼
//!           CLI / any presenter
//! ```

pub mod encoder;
pub mod frame;
pub mod naming;
pub mod recorder;
pub mod retention;
pub mod session;
pub mod source;

pub use encoder::{encoder_by_name, EncoderFactory, EncoderSettings, SegmentEncoder};
pub use frame::{PixelFormat, RawFrame};
pub use recorder::{
    RecorderEvent, RecordingConfig, SegmentReport, SessionPhase, SessionSummary, StatusSnapshot,
};
pub use retention::RetentionOrder;
pub use session::{RecorderBackends, SegmentRecorder};
pub use source::{backend_by_name, CaptureBackend, FrameSource};
