//! Segment encoders.
//!
//! An encoder is opened once per segment, fed raw frames in capture order,
//! and finished (flushed and closed) before the next segment is opened.

use std::path::Path;
use std::sync::Arc;

use blackbox_common::config::VideoCodec;
use blackbox_common::error::{BlackboxError, BlackboxResult};

use crate::frame::PixelFormat;

pub mod ffmpeg;
#[cfg(feature = "gstreamer")]
pub mod gst;

pub use ffmpeg::{FfmpegEncoder, FfmpegEncoderFactory};
#[cfg(feature = "gstreamer")]
pub use gst::{GstEncoder, GstEncoderFactory};

/// Fixed parameters of one segment's video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: VideoCodec,
}

/// An open output file accepting raw frames.
pub trait SegmentEncoder: Send {
    /// Layout `write_frame` expects.
    fn input_format(&self) -> PixelFormat;

    /// Append one frame (exactly `width * height * bpp` bytes).
    fn write_frame(&mut self, data: &[u8]) -> BlackboxResult<()>;

    /// Flush and close the file. Must be called exactly once.
    fn finish(self: Box<Self>) -> BlackboxResult<()>;

    /// Frames accepted so far.
    fn frames_written(&self) -> u64;
}

/// Opens encoders for new segments.
pub trait EncoderFactory: Send + Sync {
    /// Encoder name for logging and `--encoder` selection.
    fn name(&self) -> &str;

    /// Create `path` and prepare it to receive frames.
    fn open(&self, path: &Path, settings: &EncoderSettings)
        -> BlackboxResult<Box<dyn SegmentEncoder>>;
}

/// Names accepted by [`encoder_by_name`].
pub fn available_encoders() -> Vec<&'static str> {
    let mut names = vec!["ffmpeg"];
    if cfg!(feature = "gstreamer") {
        names.push("gstreamer");
    }
    names
}

/// Get an encoder factory by name.
pub fn encoder_by_name(name: &str) -> BlackboxResult<Arc<dyn EncoderFactory>> {
    match name {
        "ffmpeg" => Ok(Arc::new(FfmpegEncoderFactory::new())),
        #[cfg(feature = "gstreamer")]
        "gstreamer" => Ok(Arc::new(GstEncoderFactory::new())),
        other => Err(BlackboxError::unsupported(format!(
            "Unknown encoder '{other}' (available: {})",
            available_encoders().join(", ")
        ))),
    }
}

/// Check a frame buffer against the segment geometry.
pub(crate) fn check_frame_len(
    data: &[u8],
    settings: &EncoderSettings,
    format: PixelFormat,
) -> BlackboxResult<()> {
    let expected = crate::frame::frame_len(settings.width, settings.height, format);
    if data.len() != expected {
        return Err(BlackboxError::encode(format!(
            "Frame is {} bytes, encoder expects {expected} ({}x{} {:?})",
            data.len(),
            settings.width,
            settings.height,
            format
        )));
    }
    Ok(())
}
