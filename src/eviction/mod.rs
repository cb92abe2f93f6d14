//! Directory cache eviction
//!
//! Keeps a directory tree below a size ceiling by deleting its least recently
//! written files and subdirectories first:
//! - **Accounting**: [`directory_size`] sums a tree, best-effort
//! - **Planner**: [`evict_least_recently_written`] removes a byte count,
//!   oldest entries first, recursing into oversized subdirectories
//! - **Session**: [`CleaningSession`] turns "current size vs. ceiling" into
//!   a byte count, including the hysteresis buffer
//! - **Orchestrator**: [`CacheCleaner`] runs sessions once or on a timer and
//!   supports cooperative cancellation
//!
//! ## Configuration
//!
//! ```toml
//! [cleaner]
//! dir = "/var/cache/tiles"
//! max_size = "500MB"
//! buffer_percent = 10   # clean down to 90% of max_size once triggered
//! interval = "5m"       # 0 = single pass
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

mod background;
mod fs;
mod planner;
mod policy;
mod session;
mod size;

pub use background::{CacheCleaner, CleanerError, CleanerState};
pub use fs::{CacheFs, DirectoryEntrySnapshot, EntryKind, LocalFs};
pub use planner::{
    evict_least_recently_written, evict_with_outcome, purge_accessible, sort_oldest_first,
    EvictError, EvictionOutcome,
};
pub use policy::{CachePolicy, PolicyError, DEFAULT_MAX_SIZE_BYTES, MAX_BUFFER_PERCENT};
pub use session::CleaningSession;
pub use size::directory_size;

/// Cleaning statistics for one [`CacheCleaner`]
#[derive(Debug, Default)]
pub struct CleanerStats {
    /// Sessions that ran to completion
    pub sessions_completed: AtomicU64,
    /// Sessions stopped by cancellation
    pub sessions_cancelled: AtomicU64,
    /// Sessions that ended in an error
    pub sessions_failed: AtomicU64,
    /// Total bytes removed across all sessions
    pub bytes_removed: AtomicU64,
    /// Bytes removed by the most recent session
    pub last_bytes_removed: AtomicU64,
}

impl CleanerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session(&self, bytes: u64, cancelled: bool) {
        if cancelled {
            self.sessions_cancelled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sessions_completed.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_removed.fetch_add(bytes, Ordering::Relaxed);
        self.last_bytes_removed.store(bytes, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
        self.last_bytes_removed.store(0, Ordering::Relaxed);
    }

    pub fn get_sessions_completed(&self) -> u64 {
        self.sessions_completed.load(Ordering::Relaxed)
    }

    pub fn get_sessions_cancelled(&self) -> u64 {
        self.sessions_cancelled.load(Ordering::Relaxed)
    }

    pub fn get_sessions_failed(&self) -> u64 {
        self.sessions_failed.load(Ordering::Relaxed)
    }

    pub fn get_bytes_removed(&self) -> u64 {
        self.bytes_removed.load(Ordering::Relaxed)
    }

    pub fn get_last_bytes_removed(&self) -> u64 {
        self.last_bytes_removed.load(Ordering::Relaxed)
    }

    /// Sessions that finished in any way
    pub fn sessions_total(&self) -> u64 {
        self.get_sessions_completed() + self.get_sessions_cancelled() + self.get_sessions_failed()
    }
}
