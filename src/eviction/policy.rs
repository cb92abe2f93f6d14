//! Cleaning policy: which directory, how large it may grow, how far below the
//! ceiling to clean once eviction triggers, and how often to check.
//!
//! Every setter validates its input and rejects out-of-range values with a
//! distinct [`PolicyError`]; nothing is clamped.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Largest accepted buffer percentage
pub const MAX_BUFFER_PERCENT: u8 = 99;

/// Default size ceiling when none is configured
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 1_024_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Max directory size must be 0 or greater, got {0}")]
    NegativeMaxSize(i64),

    #[error("Max directory size of {0} MB does not fit in a byte count")]
    SizeOverflow(u64),

    #[error("Delete buffer is a percentage and must be between 0 and 99, got {0}")]
    BufferOutOfRange(i64),

    #[error("Interval must be 0 or greater, got {0}")]
    NegativeInterval(i64),
}

/// Configuration of a [`super::CacheCleaner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    root_path: PathBuf,
    max_size_bytes: u64,
    buffer_percent: u8,
    interval_secs: u64,
}

impl Default for CachePolicy {
    /// 1 024 000 byte ceiling, no buffer, single pass, no directory
    fn default() -> Self {
        Self {
            root_path: PathBuf::new(),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            buffer_percent: 0,
            interval_secs: 0,
        }
    }
}

impl CachePolicy {
    /// Create a validated policy
    pub fn new(
        root_path: impl Into<PathBuf>,
        max_size_bytes: u64,
        buffer_percent: u8,
        interval_secs: u64,
    ) -> Result<Self, PolicyError> {
        let mut policy = Self {
            root_path: root_path.into(),
            max_size_bytes,
            interval_secs,
            ..Default::default()
        };
        policy.set_buffer_percent(buffer_percent)?;
        Ok(policy)
    }

    /// Create a policy for `root_path` with the default limits
    pub fn for_dir(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            ..Default::default()
        }
    }

    /// Create a policy from signed values, as they arrive from config files
    pub fn from_signed(
        root_path: impl Into<PathBuf>,
        max_size_bytes: i64,
        buffer_percent: i64,
        interval_secs: i64,
    ) -> Result<Self, PolicyError> {
        let max_size_bytes =
            u64::try_from(max_size_bytes).map_err(|_| PolicyError::NegativeMaxSize(max_size_bytes))?;
        let buffer = u8::try_from(buffer_percent)
            .ok()
            .filter(|b| *b <= MAX_BUFFER_PERCENT)
            .ok_or(PolicyError::BufferOutOfRange(buffer_percent))?;
        let interval_secs =
            u64::try_from(interval_secs).map_err(|_| PolicyError::NegativeInterval(interval_secs))?;

        Self::new(root_path, max_size_bytes, buffer, interval_secs)
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn set_root_path(&mut self, root_path: impl Into<PathBuf>) {
        self.root_path = root_path.into();
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn set_max_size_bytes(&mut self, max_size_bytes: u64) {
        self.max_size_bytes = max_size_bytes;
    }

    /// Size ceiling in whole megabytes (truncating)
    pub fn max_size_mb(&self) -> u64 {
        self.max_size_bytes / BYTES_PER_MB
    }

    pub fn set_max_size_mb(&mut self, max_size_mb: u64) -> Result<(), PolicyError> {
        self.max_size_bytes = max_size_mb
            .checked_mul(BYTES_PER_MB)
            .ok_or(PolicyError::SizeOverflow(max_size_mb))?;
        Ok(())
    }

    pub fn buffer_percent(&self) -> u8 {
        self.buffer_percent
    }

    pub fn set_buffer_percent(&mut self, buffer_percent: u8) -> Result<(), PolicyError> {
        if buffer_percent > MAX_BUFFER_PERCENT {
            return Err(PolicyError::BufferOutOfRange(buffer_percent.into()));
        }
        self.buffer_percent = buffer_percent;
        Ok(())
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn set_interval_secs(&mut self, interval_secs: u64) {
        self.interval_secs = interval_secs;
    }

    /// Interval between recurring sessions, `None` for a single pass
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }

    /// The buffer converted from a percentage of the ceiling to bytes
    ///
    /// Example: ceiling 1000, buffer 10 % ⇒ 100. Cleaning starts once the
    /// directory reaches 1000 bytes and continues until it is 900 or less.
    pub fn buffer_bytes(&self) -> u64 {
        (u128::from(self.buffer_percent) * u128::from(self.max_size_bytes) / 100) as u64
    }
}
