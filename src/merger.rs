/// Configuration merger: CLI args > Env vars > Config file > Defaults
///
/// This module handles merging configuration from multiple sources:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables
/// 3. Configuration file
/// 4. Built-in defaults (lowest priority)
use anyhow::Result;
use std::time::Duration;

use crate::cli::CommonConfigArgs;
use cache_cleaner::config::{CleanerAppConfig, ConfigValue};
use cache_cleaner::eviction::CachePolicy;

/// Merged configuration for the cleaning commands
#[derive(Debug, Clone)]
pub struct MergedCleanerConfig {
    pub app: CleanerAppConfig,
}

impl MergedCleanerConfig {
    /// Merge configuration from CLI args and config file
    /// Precedence: CLI > env (already handled by clap) > config file > defaults
    pub fn merge(args: &CommonConfigArgs, file_config: Option<CleanerAppConfig>) -> Self {
        let mut app = file_config.unwrap_or_default();

        if let Some(dir) = &args.dir {
            app.cleaner.dir = dir.clone();
        }
        if let Some(max_size) = &args.max_size {
            app.cleaner.max_size = ConfigValue::from(max_size.as_str());
        }
        if let Some(buffer_percent) = args.buffer_percent {
            app.cleaner.buffer_percent = buffer_percent;
        }
        if let Some(interval) = &args.interval {
            app.cleaner.interval = ConfigValue::from(interval.as_str());
        }
        if let Some(start_delay) = &args.start_delay {
            app.cleaner.start_delay = ConfigValue::from(start_delay.as_str());
        }
        if let Some(level) = &args.log_level {
            app.log.level = Some(level.clone());
        }

        Self { app }
    }

    pub fn log_level(&self) -> Option<&str> {
        self.app.log.level.as_deref()
    }

    pub fn policy(&self) -> Result<CachePolicy> {
        self.app.cleaner.to_policy()
    }

    pub fn start_delay(&self) -> Result<Duration> {
        self.app.cleaner.start_delay()
    }
}
