//! GStreamer encoder: frames are pushed through an `appsrc` into an
//! encode/mux chain that ends in a `filesink`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use blackbox_common::config::VideoCodec;
use blackbox_common::error::{BlackboxError, BlackboxResult};

use crate::encoder::{check_frame_len, EncoderFactory, EncoderSettings, SegmentEncoder};
use crate::frame::PixelFormat;

const INPUT_FORMAT: PixelFormat = PixelFormat::Bgra;
const EOS_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GstEncoderFactory;

impl GstEncoderFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GstEncoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderFactory for GstEncoderFactory {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn open(
        &self,
        path: &Path,
        settings: &EncoderSettings,
    ) -> BlackboxResult<Box<dyn SegmentEncoder>> {
        init_gstreamer()?;

        let launch = launch_line(settings, path);
        tracing::debug!(launch = %launch, "Building GStreamer encode pipeline");

        let pipeline = gst::parse::launch(&launch)
            .map_err(|e| BlackboxError::encode(format!("Failed to build pipeline: {e}")))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| BlackboxError::encode("Launch string did not produce a pipeline"))?;

        let appsrc = pipeline
            .by_name("src")
            .and_then(|element| element.dynamic_cast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| BlackboxError::encode("Pipeline has no appsrc named 'src'"))?;

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            BlackboxError::encode(format!(
                "Failed to start pipeline for {}: {e:?}",
                path.display()
            ))
        })?;

        Ok(Box::new(GstEncoder {
            pipeline,
            appsrc,
            settings: *settings,
            path: path.to_path_buf(),
            frame_duration: gst::ClockTime::SECOND / u64::from(settings.fps.max(1)),
            frames: 0,
            finished: false,
        }))
    }
}

pub struct GstEncoder {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    settings: EncoderSettings,
    path: PathBuf,
    frame_duration: gst::ClockTime,
    frames: u64,
    finished: bool,
}

impl GstEncoder {
    /// First error message waiting on the bus, if any.
    fn pending_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        while let Some(msg) = bus.pop() {
            if let gst::MessageView::Error(e) = msg.view() {
                return Some(e.error().to_string());
            }
        }
        None
    }

    fn drain(&mut self) -> BlackboxResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        if self.appsrc.end_of_stream().is_err() {
            tracing::warn!(path = %self.path.display(), "appsrc refused EOS; output may be truncated");
        }

        let mut failure = None;
        if let Some(bus) = self.pipeline.bus() {
            let start = Instant::now();
            loop {
                let Some(remaining) = EOS_TIMEOUT.checked_sub(start.elapsed()) else {
                    tracing::warn!(path = %self.path.display(), "EOS drain timed out after 10s");
                    break;
                };
                let timeout = gst::ClockTime::from_nseconds(remaining.as_nanos() as u64);
                match bus.timed_pop(timeout) {
                    Some(msg) => match msg.view() {
                        gst::MessageView::Eos(_) => {
                            tracing::debug!(path = %self.path.display(), "EOS received; segment drained");
                            break;
                        }
                        gst::MessageView::Error(e) => {
                            failure = Some(e.error().to_string());
                            break;
                        }
                        _ => {}
                    },
                    None => {
                        tracing::warn!(path = %self.path.display(), "EOS drain timed out after 10s");
                        break;
                    }
                }
            }
        }

        self.pipeline.set_state(gst::State::Null).map_err(|e| {
            BlackboxError::encode(format!(
                "Failed to stop pipeline for {}: {e:?}",
                self.path.display()
            ))
        })?;

        match failure {
            Some(message) if is_disk_full(&message) => Err(BlackboxError::resource(format!(
                "Disk full while writing {}: {message}",
                self.path.display()
            ))),
            Some(message) => Err(BlackboxError::encode(format!(
                "Pipeline error while finishing {}: {message}",
                self.path.display()
            ))),
            None => Ok(()),
        }
    }
}

impl SegmentEncoder for GstEncoder {
    fn input_format(&self) -> PixelFormat {
        INPUT_FORMAT
    }

    fn write_frame(&mut self, data: &[u8]) -> BlackboxResult<()> {
        check_frame_len(data, &self.settings, INPUT_FORMAT)?;
        if self.finished {
            return Err(BlackboxError::encode("Encoder already finished"));
        }

        let mut buffer = gst::Buffer::from_slice(data.to_vec());
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(self.frame_duration * self.frames);
            buffer.set_duration(self.frame_duration);
        }

        if let Err(flow) = self.appsrc.push_buffer(buffer) {
            let detail = self
                .pending_error()
                .unwrap_or_else(|| format!("{flow:?}"));
            return Err(if is_disk_full(&detail) {
                BlackboxError::resource(format!("Disk full while writing {}", self.path.display()))
            } else {
                BlackboxError::encode(format!("Failed to push frame: {detail}"))
            });
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> BlackboxResult<()> {
        self.drain()
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl Drop for GstEncoder {
    fn drop(&mut self) {
        if let Err(e) = self.drain() {
            tracing::warn!(error = %e, "GStreamer encoder dropped without a clean finish");
        }
    }
}

fn launch_line(settings: &EncoderSettings, path: &Path) -> String {
    format!(
        "appsrc name=src is-live=false block=true format=time \
         caps=video/x-raw,format={format},width={w},height={h},framerate={fps}/1 \
         ! videoconvert ! {chain} ! filesink location=\"{path}\"",
        format = INPUT_FORMAT.gst_name(),
        w = settings.width,
        h = settings.height,
        fps = settings.fps,
        chain = encode_chain(settings.codec, settings.fps),
        path = escape_path(path),
    )
}

fn encode_chain(codec: VideoCodec, fps: u32) -> String {
    let keyint = fps.saturating_mul(2).max(2);
    match codec {
        VideoCodec::Xvid => format!(
            "video/x-raw,format=I420 ! avenc_mpeg4 max-key-interval={keyint} ! avimux"
        ),
        VideoCodec::H264 => format!(
            "video/x-raw,format=I420 ! x264enc tune=zerolatency speed-preset=veryfast \
             key-int-max={keyint} ! h264parse ! matroskamux"
        ),
        VideoCodec::Mjpeg => "jpegenc quality=85 ! avimux".to_string(),
    }
}

fn is_disk_full(message: &str) -> bool {
    message.contains("No space left on device")
}

fn init_gstreamer() -> BlackboxResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string())) {
        Ok(()) => Ok(()),
        Err(e) => Err(BlackboxError::encode(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}
