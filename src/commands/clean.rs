use anyhow::Result;
use tokio::signal;
use tracing::info;

use crate::cli::CleanArgs;
use cache_cleaner::cli_utils::{cleaner_prefix, format_size};
use cache_cleaner::eviction::{directory_size, CacheCleaner, LocalFs};

/// Run a single cleaning pass in the foreground
pub async fn run(args: CleanArgs) -> Result<()> {
    let merged = super::load_merged(&args.common)?;
    let mut policy = merged.policy()?;
    policy.set_interval_secs(0);

    let root = policy.root_path().to_path_buf();
    let size_before = directory_size(&LocalFs, &root);

    let cleaner = CacheCleaner::new(policy);
    if !cleaner.start() {
        anyhow::bail!("Failed to start cleaning {}", root.display());
    }

    tokio::select! {
        _ = cleaner.wait_idle() => {}
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping cleaner...");
            cleaner.stop();
            cleaner.wait_idle().await;
        }
    }

    let stats = cleaner.stats();
    if stats.get_sessions_failed() > 0 {
        anyhow::bail!("Cleaning {} failed, see log for details", root.display());
    }

    let removed = stats.get_last_bytes_removed();
    let size_after = directory_size(&LocalFs, &root);

    println!(
        "{} Removed {} ({} bytes) from {}",
        cleaner_prefix(),
        format_size(removed),
        removed,
        root.display()
    );
    println!(
        "{} Size: {} -> {}",
        cleaner_prefix(),
        format_size(size_before),
        format_size(size_after)
    );
    if stats.get_sessions_cancelled() > 0 {
        println!("{} Cleaning was interrupted before completion", cleaner_prefix());
    }

    Ok(())
}
