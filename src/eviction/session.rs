//! A single measure-then-evict pass over a cache root

use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::fs::CacheFs;
use super::planner::{evict_with_outcome, EvictError};
use super::policy::CachePolicy;
use super::size::directory_size;

/// One cleaning pass
///
/// Captures the policy values at creation so a pass is unaffected by later
/// configuration changes. Discarded once [`CleaningSession::run`] returns.
#[derive(Debug, Clone)]
pub struct CleaningSession {
    target_path: PathBuf,
    max_size_bytes: u64,
    buffer_bytes: u64,
    size_budget_bytes: u64,
    bytes_removed: u64,
    cancelled: bool,
}

impl CleaningSession {
    pub fn new(policy: &CachePolicy) -> Self {
        let buffer_bytes = policy.buffer_bytes();
        Self {
            target_path: policy.root_path().to_path_buf(),
            max_size_bytes: policy.max_size_bytes(),
            buffer_bytes,
            size_budget_bytes: policy.max_size_bytes().saturating_sub(buffer_bytes),
            bytes_removed: 0,
            cancelled: false,
        }
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Size the directory is driven down to once eviction triggers
    pub fn size_budget_bytes(&self) -> u64 {
        self.size_budget_bytes
    }

    pub fn bytes_removed(&self) -> u64 {
        self.bytes_removed
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Bytes to evict from a directory currently `current_size` bytes large
    ///
    /// Zero while the directory is below the ceiling; otherwise the excess
    /// plus the buffer.
    pub fn bytes_to_remove(&self, current_size: u64) -> u64 {
        if current_size < self.max_size_bytes {
            return 0;
        }
        current_size - self.max_size_bytes + self.buffer_bytes
    }

    /// Run the pass, returning the number of bytes removed
    ///
    /// Fails only when the root directory itself is missing or unreadable.
    pub fn run<F: CacheFs + ?Sized>(
        &mut self,
        fs: &F,
        cancel: &CancellationToken,
    ) -> Result<u64, EvictError> {
        if !fs.is_dir(&self.target_path) {
            return Err(EvictError::DirectoryNotFound(self.target_path.clone()));
        }

        let start = Instant::now();
        let current_size = directory_size(fs, &self.target_path);
        let bytes_to_remove = self.bytes_to_remove(current_size);

        if bytes_to_remove == 0 {
            info!(
                root = %self.target_path.display(),
                size_bytes = current_size,
                size_mb = current_size / (1024 * 1024),
                limit_bytes = self.max_size_bytes,
                "Directory has not reached its limit"
            );
            return Ok(0);
        }

        info!(
            root = %self.target_path.display(),
            size_bytes = current_size,
            bytes_to_remove,
            mb_to_remove = bytes_to_remove / (1024 * 1024),
            "Attempting to remove least recently written entries"
        );

        let outcome = evict_with_outcome(fs, &self.target_path, bytes_to_remove, cancel)?;
        self.cancelled = outcome.cancelled;
        self.bytes_removed = outcome.bytes_removed;

        debug!(
            root = %self.target_path.display(),
            bytes_removed = self.bytes_removed,
            cancelled = self.cancelled,
            duration_ms = start.elapsed().as_millis() as u64,
            "Cleaning session finished"
        );

        Ok(self.bytes_removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::{DirectoryEntrySnapshot, LocalFs};
    use std::fs;
    use std::io;
    use tempfile::TempDir;

    fn create_files(dir: &Path, count: usize, size: usize) {
        for i in 0..count {
            fs::write(dir.join(format!("File number {}.test", i)), vec![0u8; size]).unwrap();
        }
    }

    #[test]
    fn test_bytes_to_remove() {
        let policy = CachePolicy::new("/c", 1000, 10, 0).unwrap();
        let session = CleaningSession::new(&policy);

        assert_eq!(session.size_budget_bytes(), 900);
        assert_eq!(session.bytes_to_remove(999), 0);
        assert_eq!(session.bytes_to_remove(1000), 100);
        assert_eq!(session.bytes_to_remove(1200), 300);
    }

    #[test]
    fn test_under_budget_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), 100, 100);

        let policy = CachePolicy::new(temp.path(), 11000, 10, 0).unwrap();
        let mut session = CleaningSession::new(&policy);
        let removed = session.run(&LocalFs, &CancellationToken::new()).unwrap();

        assert_eq!(removed, 0);
        assert_eq!(directory_size(&LocalFs, temp.path()), 10000);
    }

    #[test]
    fn test_buffer_drives_size_below_ceiling() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), 100, 100);

        let policy = CachePolicy::new(temp.path(), 5000, 20, 0).unwrap();
        let mut session = CleaningSession::new(&policy);
        let removed = session.run(&LocalFs, &CancellationToken::new()).unwrap();

        assert_eq!(removed, 6000);
        assert!(!session.cancelled());
        assert!(directory_size(&LocalFs, temp.path()) <= 4000);
    }

    #[test]
    fn test_second_session_is_idempotent() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), 50, 100);

        let policy = CachePolicy::new(temp.path(), 2000, 0, 0).unwrap();
        CleaningSession::new(&policy)
            .run(&LocalFs, &CancellationToken::new())
            .unwrap();
        let size_after_first = directory_size(&LocalFs, temp.path());

        let removed = CleaningSession::new(&policy)
            .run(&LocalFs, &CancellationToken::new())
            .unwrap();

        assert!(size_after_first <= 2000);
        assert_eq!(removed, 0);
        assert_eq!(directory_size(&LocalFs, temp.path()), size_after_first);
    }

    #[test]
    fn test_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let policy = CachePolicy::for_dir(temp.path().join("gone"));

        let result = CleaningSession::new(&policy).run(&LocalFs, &CancellationToken::new());

        assert!(matches!(result, Err(EvictError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_cancelled_session_reports_cancellation() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), 10, 100);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let policy = CachePolicy::new(temp.path(), 100, 0, 0).unwrap();
        let mut session = CleaningSession::new(&policy);
        let removed = session.run(&LocalFs, &cancel).unwrap();

        assert_eq!(removed, 0);
        assert!(session.cancelled());
        assert_eq!(directory_size(&LocalFs, temp.path()), 1000);
    }

    /// Fires a stop request from inside the deletion that finishes the pass
    struct StopOnDeleteFs {
        cancel: CancellationToken,
        stop_after: usize,
        deletions: std::sync::atomic::AtomicUsize,
    }

    impl CacheFs for StopOnDeleteFs {
        fn list_dir(&self, dir: &Path) -> io::Result<Vec<DirectoryEntrySnapshot>> {
            LocalFs.list_dir(dir)
        }

        fn is_dir(&self, path: &Path) -> bool {
            LocalFs.is_dir(path)
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            LocalFs.remove_file(path)?;
            let done = self
                .deletions
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                + 1;
            if done == self.stop_after {
                self.cancel.cancel();
            }
            Ok(())
        }

        fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
            LocalFs.remove_dir_all(path)
        }
    }

    #[test]
    fn test_stop_after_full_pass_is_not_a_cancellation() {
        let temp = TempDir::new().unwrap();
        create_files(temp.path(), 10, 100);

        let fs = StopOnDeleteFs {
            cancel: CancellationToken::new(),
            stop_after: 2,
            deletions: std::sync::atomic::AtomicUsize::new(0),
        };
        let policy = CachePolicy::new(temp.path(), 800, 0, 0).unwrap();
        let mut session = CleaningSession::new(&policy);
        let removed = session.run(&fs, &fs.cancel).unwrap();

        assert!(fs.cancel.is_cancelled());
        assert_eq!(removed, 200);
        assert!(!session.cancelled());
        assert_eq!(directory_size(&LocalFs, temp.path()), 800);
    }
}
