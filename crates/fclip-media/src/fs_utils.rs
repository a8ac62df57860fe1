//! Filesystem helpers for render artifacts and temporary files.
//!
//! Temporary files are tied to the lifecycle of the operation that created
//! them. [`reap_stale_files`] sweeps whatever a crashed process left behind
//! and is meant to be driven by the caller's own schedule.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Unique output path for one render: `{dir}/{clip_id}-{uuid}.{ext}`.
///
/// The clip id is reduced to filename-safe characters.
pub fn unique_output_path(dir: impl AsRef<Path>, clip_id: &str, extension: &str) -> PathBuf {
    let stem: String = clip_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    let stem = if stem.is_empty() { "clip".to_string() } else { stem };
    dir.as_ref()
        .join(format!("{}-{}.{}", stem, uuid::Uuid::new_v4().simple(), extension))
}

/// Move a file, falling back to copy-then-delete across filesystems.
///
/// The cross-device copy lands on a sibling `.tmp` path first and is then
/// renamed into place, so `dst` never holds a partial file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERRNO) => {
            debug!(src = %src.display(), dst = %dst.display(), "Cross-device move, copying");
            let staging = dst.with_extension("tmp");
            if let Err(e) = fs::copy(src, &staging).await {
                remove_file_best_effort(&staging).await;
                return Err(MediaError::from(e));
            }
            if let Err(e) = fs::rename(&staging, dst).await {
                remove_file_best_effort(&staging).await;
                return Err(MediaError::from(e));
            }
            remove_file_best_effort(src).await;
            Ok(())
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Delete a file, logging (not returning) failures. A missing file is not a failure.
///
/// Returns whether the file is gone afterwards.
pub async fn remove_file_best_effort(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
            false
        }
    }
}

/// Counts from one [`reap_stale_files`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub removed: usize,
    pub kept: usize,
    pub failed: usize,
}

/// Delete regular files in `dir` whose modification time is older than `ttl`.
///
/// Not recursive. A missing directory yields an empty report.
pub async fn reap_stale_files(dir: impl AsRef<Path>, ttl: Duration) -> MediaResult<ReapReport> {
    let dir = dir.as_ref();
    let mut report = ReapReport::default();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Failed to stat file during reap");
                report.failed += 1;
                continue;
            }
        };

        // Unknown mtime or a clock skewed into the future both count as fresh
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();

        if age < ttl {
            report.kept += 1;
        } else if remove_file_best_effort(entry.path()).await {
            report.removed += 1;
        } else {
            report.failed += 1;
        }
    }

    debug!(
        dir = %dir.display(),
        removed = report.removed,
        kept = report.kept,
        failed = report.failed,
        "Reaped stale files"
    );
    Ok(report)
}
