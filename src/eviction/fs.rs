//! Filesystem access used by the eviction engine
//!
//! The engine only ever needs four things from the host: list the immediate
//! children of a directory, ask whether a path is a directory, delete a file
//! and delete a directory tree. Everything is fallible; entries disappearing
//! between a listing and a delete is normal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Kind of a directory child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One child of a directory as seen during a single scan
///
/// For directories `size_bytes` is always 0 here; the recursive size is
/// computed on demand by [`super::directory_size`] and never cached.
#[derive(Debug, Clone)]
pub struct DirectoryEntrySnapshot {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub last_write_time: SystemTime,
    pub size_bytes: u64,
}

impl DirectoryEntrySnapshot {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Trait for filesystems the cleaner can operate on
pub trait CacheFs: Send + Sync + 'static {
    /// List the immediate children of `dir`
    ///
    /// Children whose metadata cannot be read are skipped.
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<DirectoryEntrySnapshot>>;

    /// Whether `path` currently exists and is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Delete a single file
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Delete a directory and everything below it
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`CacheFs`] backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl CacheFs for LocalFs {
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<DirectoryEntrySnapshot>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };

            let path = entry.path();
            // Symlinks are never followed: they are sized and deleted as files
            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping entry without metadata");
                    continue;
                }
            };

            let last_write_time = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let (kind, size_bytes) = if metadata.is_dir() {
                (EntryKind::Directory, 0)
            } else {
                (EntryKind::File, metadata.len())
            };

            entries.push(DirectoryEntrySnapshot {
                path,
                kind,
                last_write_time,
                size_bytes,
            });
        }

        Ok(entries)
    }

    fn is_dir(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
}
