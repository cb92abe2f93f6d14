use anyhow::Result;
use tracing::info;

use crate::cli::{CommonConfigArgs, ConfigCommands};
use crate::merger::MergedCleanerConfig;
use cache_cleaner::cli_utils::format_size;
use cache_cleaner::config::CleanerAppConfig;
use cache_cleaner::config_discovery::load_config_with_discovery;

pub fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Generate => generate(),
        ConfigCommands::Show { common } => show(&common),
    }
}

fn validate(path: &str) -> Result<()> {
    info!("Validating config file: {}", path);

    let config = CleanerAppConfig::from_file(path)?;
    config.validate()?;
    let policy = config.cleaner.to_policy()?;

    println!("✓ Configuration file is valid: {}", path);
    println!("\nSummary:");
    println!("  - Directory: {}", policy.root_path().display());
    println!(
        "  - Max size: {} ({} bytes)",
        format_size(policy.max_size_bytes()),
        policy.max_size_bytes()
    );
    println!("  - Buffer: {}%", policy.buffer_percent());
    match policy.interval() {
        Some(interval) => println!("  - Interval: {}s", interval.as_secs()),
        None => println!("  - Interval: single pass"),
    }
    println!("  - Start delay: {}s", config.cleaner.start_delay()?.as_secs());

    Ok(())
}

fn generate() -> Result<()> {
    info!("Generating example config");

    println!("{}", CleanerAppConfig::example());

    Ok(())
}

fn show(args: &CommonConfigArgs) -> Result<()> {
    info!("Showing effective configuration");

    let file_config = load_config_with_discovery(args.config.as_deref())?;
    let merged = MergedCleanerConfig::merge(args, file_config);

    println!("Effective Configuration:\n");
    println!("{}", toml::to_string_pretty(&merged.app)?);

    Ok(())
}
