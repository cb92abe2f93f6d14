use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use crate::cli::WatchArgs;
use cache_cleaner::cli_utils::{cleaner_prefix, format_size};
use cache_cleaner::eviction::CacheCleaner;

/// Run the recurring cleaner until interrupted
pub async fn run(args: WatchArgs) -> Result<()> {
    let merged = super::load_merged(&args.common)?;
    let policy = merged.policy()?;
    let start_delay = merged.start_delay()?;

    let Some(interval) = policy.interval() else {
        anyhow::bail!("watch needs a non-zero interval; use `clean` for a single pass");
    };

    println!(
        "{} Watching {} (max {}, buffer {}%, every {}s). Press Ctrl+C to stop.",
        cleaner_prefix(),
        policy.root_path().display(),
        format_size(policy.max_size_bytes()),
        policy.buffer_percent(),
        interval.as_secs()
    );

    let root = policy.root_path().to_path_buf();
    let cleaner = CacheCleaner::new(policy);

    if start_delay.is_zero() {
        if !cleaner.start() {
            anyhow::bail!("Failed to start cleaning {}", root.display());
        }
    } else {
        cleaner.start_delayed(start_delay)?;
    }

    signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down gracefully...");

    cleaner.stop();
    cleaner.wait_idle().await;

    let stats = cleaner.stats();
    println!(
        "{} Stopped after {} session(s), {} removed in total",
        cleaner_prefix(),
        stats.sessions_total(),
        format_size(stats.get_bytes_removed())
    );

    Ok(())
}
