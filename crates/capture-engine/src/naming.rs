//! Timestamped segment file names.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use blackbox_common::config::VideoCodec;

const PREFIX: &str = "recording_";

/// `recording_YYYYMMDD_HHMMSS.<ext>` for a segment started at `started_at`.
pub fn segment_file_name(started_at: &DateTime<Local>, codec: VideoCodec) -> String {
    format!(
        "{PREFIX}{}.{}",
        started_at.format("%Y%m%d_%H%M%S"),
        codec.container_extension()
    )
}

/// Path for a new segment in `dir`.
///
/// Never returns an existing path: if the plain name is taken a `_1`, `_2`,
/// ... suffix is appended before the extension.
pub fn segment_path(dir: &Path, started_at: &DateTime<Local>, codec: VideoCodec) -> PathBuf {
    let stem = format!("{PREFIX}{}", started_at.format("%Y%m%d_%H%M%S"));
    let ext = codec.container_extension();

    let candidate = dir.join(format!("{stem}.{ext}"));
    if !candidate.exists() {
        return candidate;
    }
    let mut suffix = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}_{suffix}.{ext}"));
        if !candidate.exists() {
            tracing::debug!(file = %candidate.display(), "Segment name taken; using suffix");
            return candidate;
        }
        suffix += 1;
    }
}
