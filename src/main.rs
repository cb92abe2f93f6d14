mod cli;
mod commands;
mod merger;

use anyhow::Result;
use clap::Parser;

use cache_cleaner::logging;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Dispatch to appropriate command handler; cleaning commands initialize
    // logging themselves once the config file has been read
    match cli.command {
        Commands::Clean(args) => commands::clean::run(args).await,
        Commands::Watch(args) => commands::watch::run(args).await,
        Commands::Size(args) => {
            logging::init(None);
            commands::size::run(args)
        }
        Commands::Purge(args) => {
            logging::init(None);
            commands::purge::run(args)
        }
        Commands::Config(args) => {
            logging::init(None);
            commands::config::run(args.command)
        }
    }
}
