//! Least-recently-written eviction over a directory tree
//!
//! Children of a directory are visited oldest `last_write_time` first (ties
//! broken by path name). Files are deleted outright. A subdirectory whose whole
//! size fits in the remaining need is deleted in one operation (fast path);
//! otherwise the walk recurses into it with the remaining need as its budget
//! and evicts its own children by their own timestamps (slow path).
//!
//! Cancellation is checked when entering every directory and after every
//! entry, at every depth.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::fs::{CacheFs, DirectoryEntrySnapshot, EntryKind};
use super::size::directory_size;
use crate::logging::operations;

#[derive(Debug, Error)]
pub enum EvictError {
    #[error("Could not find directory '{}' during removal operation", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Failed to list directory '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Order entries for eviction: oldest write first, then by path
pub fn sort_oldest_first(entries: &mut [DirectoryEntrySnapshot]) {
    entries.sort_by(|a, b| {
        a.last_write_time
            .cmp(&b.last_write_time)
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// Result of one eviction walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    pub bytes_removed: u64,
    /// The walk stopped on cancellation with entries left to evict
    pub cancelled: bool,
}

/// Remove at least `bytes_to_remove` bytes from `path`, stalest entries first
///
/// Returns the number of bytes actually removed, which overshoots the request
/// by at most the last deleted entry, and falls short when the tree runs out
/// of deletable entries or `cancel` fires.
///
/// `bytes_to_remove` must be positive.
pub fn evict_least_recently_written<F: CacheFs + ?Sized>(
    fs: &F,
    path: &Path,
    bytes_to_remove: u64,
    cancel: &CancellationToken,
) -> Result<u64, EvictError> {
    evict_with_outcome(fs, path, bytes_to_remove, cancel).map(|outcome| outcome.bytes_removed)
}

/// [`evict_least_recently_written`], also reporting whether cancellation cut
/// the walk short
///
/// A token cancelled after the walk has already reached its target, or run
/// out of entries, does not mark the outcome as cancelled.
pub fn evict_with_outcome<F: CacheFs + ?Sized>(
    fs: &F,
    path: &Path,
    bytes_to_remove: u64,
    cancel: &CancellationToken,
) -> Result<EvictionOutcome, EvictError> {
    debug_assert!(bytes_to_remove > 0, "eviction requested for 0 bytes");

    if !fs.is_dir(path) {
        return Err(EvictError::DirectoryNotFound(path.to_path_buf()));
    }

    if cancel.is_cancelled() {
        return Ok(EvictionOutcome {
            bytes_removed: 0,
            cancelled: true,
        });
    }

    let mut entries = fs.list_dir(path).map_err(|source| EvictError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    sort_oldest_first(&mut entries);

    let mut outcome = EvictionOutcome::default();

    for (index, entry) in entries.iter().enumerate() {
        if outcome.bytes_removed >= bytes_to_remove {
            break;
        }

        let remaining = bytes_to_remove - outcome.bytes_removed;
        match entry.kind {
            EntryKind::File => outcome.bytes_removed += evict_file(fs, entry),
            EntryKind::Directory => {
                let nested = evict_directory(fs, entry, remaining, cancel);
                outcome.bytes_removed += nested.bytes_removed;
                if nested.cancelled {
                    outcome.cancelled = true;
                    break;
                }
            }
        }

        if cancel.is_cancelled() {
            outcome.cancelled =
                outcome.bytes_removed < bytes_to_remove && index + 1 < entries.len();
            debug!(
                path = %path.display(),
                bytes_removed = outcome.bytes_removed,
                cancelled = outcome.cancelled,
                "Eviction cancelled"
            );
            break;
        }
    }

    Ok(outcome)
}

fn evict_file<F: CacheFs + ?Sized>(fs: &F, entry: &DirectoryEntrySnapshot) -> u64 {
    match fs.remove_file(&entry.path) {
        Ok(()) => {
            debug!(
                path = %entry.path.display(),
                size_bytes = entry.size_bytes,
                "Evicted file"
            );
            entry.size_bytes
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %entry.path.display(), "File vanished before eviction");
            0
        }
        Err(e) => {
            warn!(
                operation = operations::EVICT,
                path = %entry.path.display(),
                error = %e,
                "Failed to evict file"
            );
            0
        }
    }
}

fn evict_directory<F: CacheFs + ?Sized>(
    fs: &F,
    entry: &DirectoryEntrySnapshot,
    remaining: u64,
    cancel: &CancellationToken,
) -> EvictionOutcome {
    let size = directory_size(fs, &entry.path);

    if size < remaining {
        // Fast path: the whole subtree fits in what is still needed
        let bytes_removed = match fs.remove_dir_all(&entry.path) {
            Ok(()) => {
                debug!(
                    path = %entry.path.display(),
                    size_bytes = size,
                    "Evicted directory tree"
                );
                size
            }
            Err(e) => {
                warn!(
                    operation = operations::EVICT,
                    path = %entry.path.display(),
                    error = %e,
                    "Failed to evict directory tree, counting what was removed"
                );
                size.saturating_sub(directory_size(fs, &entry.path))
            }
        };
        return EvictionOutcome {
            bytes_removed,
            cancelled: false,
        };
    }

    match evict_with_outcome(fs, &entry.path, remaining, cancel) {
        Ok(outcome) => outcome,
        Err(e) => {
            debug!(path = %entry.path.display(), error = %e, "Skipping subdirectory");
            EvictionOutcome::default()
        }
    }
}

/// Delete everything below `path` that can be deleted, keeping `path` itself
///
/// Failures are logged and skipped. Returns the bytes freed.
pub fn purge_accessible<F: CacheFs + ?Sized>(fs: &F, path: &Path) -> u64 {
    let entries = match fs.list_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                operation = operations::PURGE,
                path = %path.display(),
                error = %e,
                "Cannot list directory for purge"
            );
            return 0;
        }
    };

    let (dirs, files): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| e.is_dir());
    let mut freed = 0u64;

    for file in &files {
        freed += evict_file(fs, file);
    }

    for dir in &dirs {
        freed += purge_accessible(fs, &dir.path);
        if let Err(e) = fs.remove_dir_all(&dir.path) {
            warn!(
                operation = operations::PURGE,
                path = %dir.path.display(),
                error = %e,
                "Cannot delete directory"
            );
        }
    }

    freed
}
