//! Application configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default recording settings.
    pub recording: RecordingDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Directory segments are written to.
    pub output_dir: PathBuf,

    /// Zero-based index into the detected monitor list.
    pub monitor_index: usize,

    /// Target FPS.
    pub fps: u32,

    /// Length of each segment in seconds.
    pub segment_duration_secs: u64,

    /// Video codec (selects the container too).
    pub codec: VideoCodec,

    /// Maximum number of files kept in `output_dir`.
    pub retention_cap: usize,

    /// Upper bound on a single frame grab, in milliseconds.
    pub capture_timeout_ms: u64,

    /// Pause before reopening a segment that ended with an error.
    pub retry_delay_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "blackbox=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

/// Supported segment codecs. Each codec maps to exactly one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// MPEG-4 Part 2 tagged `XVID`, in AVI.
    #[default]
    Xvid,
    /// H.264, in Matroska.
    H264,
    /// Motion JPEG, in AVI.
    Mjpeg,
}

impl VideoCodec {
    /// File extension of the container paired with this codec.
    pub fn container_extension(self) -> &'static str {
        match self {
            VideoCodec::Xvid => "avi",
            VideoCodec::H264 => "mkv",
            VideoCodec::Mjpeg => "avi",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VideoCodec::Xvid => "xvid",
            VideoCodec::H264 => "h264",
            VideoCodec::Mjpeg => "mjpeg",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xvid" | "mpeg4" => Ok(VideoCodec::Xvid),
            "h264" | "x264" | "avc" => Ok(VideoCodec::H264),
            "mjpeg" | "mjpg" => Ok(VideoCodec::Mjpeg),
            other => Err(format!(
                "Unknown codec '{other}' (expected one of: xvid, h264, mjpeg)"
            )),
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./recordings"),
            monitor_index: 0,
            fps: 15,
            segment_duration_secs: 60,
            codec: VideoCodec::Xvid,
            retention_cap: 30,
            capture_timeout_ms: 2000,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("blackbox").join("config.json")
}
