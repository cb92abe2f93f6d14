//! XDG Base Directory support
//!
//! Follows the XDG Base Directory Specification:
//! - https://specifications.freedesktop.org/basedir-spec/basedir-spec-latest.html
//!
//! Only the configuration directory is used:
//! - `$XDG_CONFIG_HOME/cache-cleaner/` (default: `~/.config/cache-cleaner/`)

use std::path::PathBuf;

const APP_DIR: &str = "cache-cleaner";

/// Get the cache-cleaner configuration directory
///
/// Respects XDG_CONFIG_HOME environment variable.
/// Falls back to `$HOME/.config/cache-cleaner`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        // XDG default: $HOME/.config
        home.join(".config").join(APP_DIR)
    } else {
        PathBuf::from(".cache-cleaner")
    }
}
