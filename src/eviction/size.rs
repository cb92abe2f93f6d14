//! Recursive, best-effort directory size accounting

use std::path::Path;
use tracing::debug;

use super::fs::CacheFs;

/// Total size in bytes of every file below `path`
///
/// Entries that cannot be read (permission errors, entries deleted while the
/// walk is in progress) contribute 0. Never fails; the result is only as
/// consistent as the live filesystem allows.
pub fn directory_size<F: CacheFs + ?Sized>(fs: &F, path: &Path) -> u64 {
    let entries = match fs.list_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(
                path = %path.display(),
                error = %e,
                "Ignoring unreadable directory while computing size"
            );
            return 0;
        }
    };

    entries
        .iter()
        .map(|entry| {
            if entry.is_dir() {
                directory_size(fs, &entry.path)
            } else {
                entry.size_bytes
            }
        })
        .sum()
}
