use clap::{Parser, Subcommand};

/// cache-cleaner - Keep a cache directory below a size ceiling
///
/// Deletes the least recently written files and subdirectories of a
/// directory once it grows past its configured maximum size.
#[derive(Parser, Debug)]
#[command(name = "cache-cleaner")]
#[command(author = "Tuist Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bounded-size directory cache cleaner", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Common configuration arguments shared across cleaning commands
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonConfigArgs {
    /// Config file path
    #[arg(short = 'c', long, env = "CACHE_CLEANER_CONFIG")]
    pub config: Option<String>,

    /// Directory to keep below the size limit
    #[arg(long, env = "CACHE_CLEANER_DIR")]
    pub dir: Option<String>,

    /// Max directory size (e.g., "5GB", "500MB", or bytes)
    #[arg(long, env = "CACHE_CLEANER_MAX_SIZE", allow_hyphen_values = true)]
    pub max_size: Option<String>,

    /// Percentage of the max size to free beyond the excess (0-99)
    #[arg(long, env = "CACHE_CLEANER_BUFFER_PERCENT", allow_hyphen_values = true)]
    pub buffer_percent: Option<i64>,

    /// Time between size checks (e.g., "30s", "5m"); 0 runs a single pass
    #[arg(long, env = "CACHE_CLEANER_INTERVAL", allow_hyphen_values = true)]
    pub interval: Option<String>,

    /// Delay before the first cleaning pass (e.g., "10s")
    #[arg(long, env = "CACHE_CLEANER_START_DELAY")]
    pub start_delay: Option<String>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, env = "CACHE_CLEANER_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single cleaning pass and exit
    Clean(CleanArgs),

    /// Clean on a recurring interval until interrupted
    Watch(WatchArgs),

    /// Print the total size of a directory
    Size(SizeArgs),

    /// Delete everything deletable inside a directory
    Purge(PurgeArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct CleanArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,
}

#[derive(Parser, Debug)]
pub struct SizeArgs {
    /// Directory to measure
    pub dir: String,

    /// Print the raw byte count instead of a human-readable size
    #[arg(long)]
    pub bytes: bool,
}

#[derive(Parser, Debug)]
pub struct PurgeArgs {
    /// Directory to empty (the directory itself is kept)
    pub dir: String,

    /// Do not ask for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file
        path: String,
    },
    /// Generate example config file
    Generate,
    /// Show effective configuration (merged from all sources)
    Show {
        #[command(flatten)]
        common: CommonConfigArgs,
    },
}
