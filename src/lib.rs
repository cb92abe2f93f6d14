// Library interface for cache-cleaner
// This allows integration tests and external code to embed the cleaner

pub mod cli_utils;
pub mod config;
pub mod config_discovery;
pub mod eviction;
pub mod logging;
pub mod xdg;

// Re-export commonly used types
pub use config::CleanerAppConfig;
pub use config_discovery::{discover_config, load_config_with_discovery};
pub use eviction::{
    directory_size, CacheCleaner, CacheFs, CachePolicy, CleanerError, CleanerState, CleanerStats,
    CleaningSession, EvictError, LocalFs, PolicyError,
};
