//! Encoder that pipes raw frames into an `ffmpeg` child process.

use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use blackbox_common::config::VideoCodec;
use blackbox_common::error::{BlackboxError, BlackboxResult};

use crate::encoder::{check_frame_len, EncoderFactory, EncoderSettings, SegmentEncoder};
use crate::frame::PixelFormat;

/// Raw layout fed to ffmpeg.
const INPUT_FORMAT: PixelFormat = PixelFormat::Bgr24;

pub struct FfmpegEncoderFactory {
    binary: String,
}

impl FfmpegEncoderFactory {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    /// Use a specific ffmpeg executable.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegEncoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn open(
        &self,
        path: &Path,
        settings: &EncoderSettings,
    ) -> BlackboxResult<Box<dyn SegmentEncoder>> {
        let args = encode_args(settings, path);
        tracing::debug!(args = ?args, "Spawning ffmpeg encoder");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    BlackboxError::encode(format!(
                        "{} was not found on PATH; install ffmpeg to record",
                        self.binary
                    ))
                } else {
                    BlackboxError::encode(format!("Failed to start ffmpeg: {e}"))
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BlackboxError::encode("Failed to capture ffmpeg stdin"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BlackboxError::encode("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut stderr = stderr;
            let mut output = String::new();
            match stderr.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        tracing::debug!(pid = child.id(), path = %path.display(), "ffmpeg encoder started");

        Ok(Box::new(FfmpegEncoder {
            child,
            stdin: Some(BufWriter::with_capacity(1 << 20, stdin)),
            stderr_task: Some(stderr_task),
            settings: *settings,
            path: path.to_path_buf(),
            frames: 0,
        }))
    }
}

pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr_task: Option<JoinHandle<String>>,
    settings: EncoderSettings,
    path: PathBuf,
    frames: u64,
}

impl FfmpegEncoder {
    fn close(&mut self) -> BlackboxResult<()> {
        let Some(mut stdin) = self.stdin.take() else {
            return Ok(());
        };
        let flushed = stdin.flush();
        // Closing stdin signals end of input; ffmpeg then writes the trailer.
        drop(stdin);

        let status = self
            .child
            .wait()
            .map_err(|e| BlackboxError::encode(format!("Failed waiting for ffmpeg: {e}")))?;
        let stderr = self
            .stderr_task
            .take()
            .and_then(|task| task.join().ok())
            .unwrap_or_default();

        if stderr.contains("No space left on device") {
            return Err(BlackboxError::resource(format!(
                "Disk full while writing {}",
                self.path.display()
            )));
        }
        if !status.success() {
            return Err(BlackboxError::encode(format!(
                "ffmpeg exited with {status} for {}: {}",
                self.path.display(),
                stderr_tail(&stderr)
            )));
        }
        flushed.map_err(|e| BlackboxError::encode_io("Failed to flush frames to ffmpeg", e))
    }
}

impl SegmentEncoder for FfmpegEncoder {
    fn input_format(&self) -> PixelFormat {
        INPUT_FORMAT
    }

    fn write_frame(&mut self, data: &[u8]) -> BlackboxResult<()> {
        check_frame_len(data, &self.settings, INPUT_FORMAT)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| BlackboxError::encode("Encoder already finished"))?;
        stdin
            .write_all(data)
            .map_err(|e| BlackboxError::encode_io("Failed to write frame to ffmpeg", e))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> BlackboxResult<()> {
        self.close()
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "ffmpeg encoder dropped without a clean finish");
        }
    }
}

/// Full ffmpeg command line for one segment.
fn encode_args(settings: &EncoderSettings, path: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        INPUT_FORMAT.ffmpeg_name().into(),
        "-video_size".into(),
        format!("{}x{}", settings.width, settings.height),
        "-framerate".into(),
        settings.fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
        "-an".into(),
        // 4:2:0 chroma needs even dimensions.
        "-vf".into(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
    ];
    args.extend(codec_args(settings.codec, settings.fps));
    args.push(path.to_string_lossy().into_owned());
    args
}

fn codec_args(codec: VideoCodec, fps: u32) -> Vec<String> {
    let keyint = fps.saturating_mul(2).max(2);
    match codec {
        VideoCodec::Xvid => vec![
            "-c:v".to_string(),
            "mpeg4".to_string(),
            "-vtag".to_string(),
            "xvid".to_string(),
            "-q:v".to_string(),
            "5".to_string(),
            "-g".to_string(),
            keyint.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ],
        VideoCodec::H264 => vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-tune".to_string(),
            "zerolatency".to_string(),
            "-g".to_string(),
            keyint.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ],
        VideoCodec::Mjpeg => vec![
            "-c:v".to_string(),
            "mjpeg".to_string(),
            "-q:v".to_string(),
            "5".to_string(),
            "-pix_fmt".to_string(),
            "yuvj420p".to_string(),
        ],
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(3);
    if lines.is_empty() {
        "<no output>".to_string()
    } else {
        lines[start..].join(" | ")
    }
}
