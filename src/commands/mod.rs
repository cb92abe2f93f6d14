pub mod clean;
pub mod config;
pub mod purge;
pub mod size;
pub mod watch;

use anyhow::Result;

use crate::cli::CommonConfigArgs;
use crate::merger::MergedCleanerConfig;
use cache_cleaner::config_discovery::load_config_with_discovery;
use cache_cleaner::logging;

/// Load the config file (explicit or discovered), apply CLI/env overrides
/// and initialize logging with the resulting level
fn load_merged(args: &CommonConfigArgs) -> Result<MergedCleanerConfig> {
    let file_config = load_config_with_discovery(args.config.as_deref())?;
    let merged = MergedCleanerConfig::merge(args, file_config);
    logging::init(merged.log_level());
    Ok(merged)
}
