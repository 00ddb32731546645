//! Retention manager: keeps the output directory at or under a file cap.
//!
//! Only regular files count. Directories and symlinks are left alone, and
//! anything that disappears mid-pass is treated as already deleted.

use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

use blackbox_common::error::{BlackboxError, BlackboxResult};

/// Which files count as "oldest".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionOrder {
    /// Last-modified time ascending, ties broken by name.
    #[default]
    Modified,
    /// File name ascending. Timestamped segment names sort chronologically.
    Name,
}

struct Candidate {
    name: String,
    modified: SystemTime,
}

/// Delete the oldest regular files in `dir` until at most `cap` remain.
///
/// Returns the deleted file names in deletion order.
pub fn enforce(dir: &Path, cap: usize) -> BlackboxResult<Vec<String>> {
    enforce_with_order(dir, cap, RetentionOrder::Modified)
}

pub fn enforce_with_order(
    dir: &Path,
    cap: usize,
    order: RetentionOrder,
) -> BlackboxResult<Vec<String>> {
    let mut files = list_regular_files(dir)?;
    if files.len() <= cap {
        return Ok(Vec::new());
    }
    sort_oldest_first(&mut files, order);
    Ok(evict(dir, files, cap))
}

fn sort_oldest_first(files: &mut [Candidate], order: RetentionOrder) {
    files.sort_by(|a, b| match order {
        RetentionOrder::Modified => a
            .modified
            .cmp(&b.modified)
            .then_with(|| compare_names(&a.name, &b.name)),
        RetentionOrder::Name => compare_names(&a.name, &b.name),
    });
}

/// Remove `files` (oldest first) until at most `cap` are left.
fn evict(dir: &Path, files: Vec<Candidate>, cap: usize) -> Vec<String> {
    let mut remaining = files.len();
    let mut removed = Vec::new();
    for file in files {
        if remaining <= cap {
            break;
        }
        match fs::remove_file(dir.join(&file.name)) {
            Ok(()) => {
                tracing::info!(file = %file.name, "Deleted old segment");
                removed.push(file.name);
                remaining -= 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(file = %file.name, "Segment vanished before deletion; skipping");
                remaining -= 1;
            }
            Err(e) => {
                let err = BlackboxError::retention(format!("Failed to delete {}: {e}", file.name));
                tracing::warn!(error = %err, "Retention pass continuing");
            }
        }
    }

    if remaining > cap {
        tracing::warn!(
            dir = %dir.display(),
            remaining,
            cap,
            "Directory still over retention cap after cleanup"
        );
    }
    removed
}

/// Compare file names with digit runs ordered by value, so collision
/// suffixes sort `_2` before `_10`.
fn compare_names(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        match (a.is_empty(), b.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        let (chunk_a, rest_a) = split_chunk(a);
        let (chunk_b, rest_b) = split_chunk(b);
        let ord = if is_digits(chunk_a) && is_digits(chunk_b) {
            let (va, vb) = (chunk_a.trim_start_matches('0'), chunk_b.trim_start_matches('0'));
            va.len()
                .cmp(&vb.len())
                .then_with(|| va.cmp(vb))
                .then_with(|| chunk_a.len().cmp(&chunk_b.len()))
        } else {
            chunk_a.cmp(chunk_b)
        };
        if ord != Ordering::Equal {
            return ord;
        }
        a = rest_a;
        b = rest_b;
    }
}

fn is_digits(s: &str) -> bool {
    s.as_bytes().first().is_some_and(u8::is_ascii_digit)
}

/// Split off the leading run of digits or non-digits.
fn split_chunk(s: &str) -> (&str, &str) {
    let digits = is_digits(s);
    let end = s
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit() != digits)
        .map_or(s.len(), |(i, _)| i);
    s.split_at(end)
}

fn list_regular_files(dir: &Path) -> BlackboxResult<Vec<Candidate>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        BlackboxError::resource(format!("Cannot list {}: {e}", dir.display()))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        // file_type() does not follow symlinks.
        match entry.file_type() {
            Ok(kind) if kind.is_file() => {}
            _ => continue,
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(time) => time,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(_) => SystemTime::UNIX_EPOCH,
        };
        files.push(Candidate {
            name: entry.file_name().to_string_lossy().into_owned(),
            modified,
        });
    }
    Ok(files)
}
