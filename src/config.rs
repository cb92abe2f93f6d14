use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::eviction::{CachePolicy, DEFAULT_MAX_SIZE_BYTES};

/// Complete cache-cleaner configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleanerAppConfig {
    #[serde(default)]
    pub cleaner: CleanerConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// A setting written either as a plain integer or as a string with a unit
/// suffix (`max_size = 1048576` or `max_size = "1MB"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{}", value),
            Self::Text(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl ConfigValue {
    /// Size in bytes; negative values are passed through for policy validation
    pub fn as_size(&self) -> Result<i64> {
        match self {
            Self::Int(value) => Ok(*value),
            Self::Text(value) => parse_size(value),
        }
    }

    /// Duration in seconds; negative values are passed through for policy
    /// validation
    pub fn as_secs(&self) -> Result<i64> {
        match self {
            Self::Int(value) => Ok(*value),
            Self::Text(value) => parse_duration(value),
        }
    }
}

/// Cleaner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanerConfig {
    /// Directory to keep below `max_size`
    #[serde(default)]
    pub dir: String,

    /// Maximum directory size (e.g., "500MB", "5GB", or bytes)
    #[serde(default = "default_max_size")]
    pub max_size: ConfigValue,

    /// Percentage of `max_size` to remove beyond the excess once cleaning starts (0-99)
    #[serde(default)]
    pub buffer_percent: i64,

    /// Time between size checks (e.g., "30s", "5m"); 0 runs a single pass
    #[serde(default = "default_interval")]
    pub interval: ConfigValue,

    /// Delay before the first start
    #[serde(default = "default_start_delay")]
    pub start_delay: ConfigValue,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            dir: String::new(),
            max_size: default_max_size(),
            buffer_percent: 0,
            interval: default_interval(),
            start_delay: default_start_delay(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    /// Default log level when RUST_LOG is not set (trace|debug|info|warn|error)
    #[serde(default)]
    pub level: Option<String>,
}

fn default_max_size() -> ConfigValue {
    ConfigValue::Int(DEFAULT_MAX_SIZE_BYTES as i64)
}

fn default_interval() -> ConfigValue {
    ConfigValue::Int(0)
}

fn default_start_delay() -> ConfigValue {
    ConfigValue::Int(0)
}

/// Parse a size string (e.g., "5GB", "100MB", "1TB", "-1") into bytes
pub fn parse_size(size_str: &str) -> Result<i64> {
    let size_str = size_str.trim().to_uppercase();
    let (negative, size_str) = match size_str.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, size_str.as_str()),
    };

    let (num, multiplier): (&str, i64) = if let Some(num) = size_str.strip_suffix("TB") {
        (num, 1024 * 1024 * 1024 * 1024)
    } else if let Some(num) = size_str.strip_suffix("GB") {
        (num, 1024 * 1024 * 1024)
    } else if let Some(num) = size_str.strip_suffix("MB") {
        (num, 1024 * 1024)
    } else if let Some(num) = size_str.strip_suffix("KB") {
        (num, 1024)
    } else if let Some(num) = size_str.strip_suffix('B') {
        (num, 1)
    } else {
        // Assume bytes
        (size_str, 1)
    };

    let num: i64 = num
        .trim()
        .parse()
        .with_context(|| format!("Invalid size: {}", size_str))?;
    let bytes = num
        .checked_mul(multiplier)
        .with_context(|| format!("Size out of range: {}", size_str))?;

    Ok(if negative { -bytes } else { bytes })
}

/// Parse a duration string (e.g., "7d", "24h", "30m", "10s", "-1") into seconds
pub fn parse_duration(duration_str: &str) -> Result<i64> {
    let duration_str = duration_str.trim().to_lowercase();
    let (negative, duration_str) = match duration_str.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, duration_str.as_str()),
    };

    let (num, multiplier): (&str, i64) = if let Some(num) = duration_str.strip_suffix('d') {
        (num, 24 * 60 * 60)
    } else if let Some(num) = duration_str.strip_suffix('h') {
        (num, 60 * 60)
    } else if let Some(num) = duration_str.strip_suffix('m') {
        (num, 60)
    } else if let Some(num) = duration_str.strip_suffix('s') {
        (num, 1)
    } else {
        // Assume seconds
        (duration_str, 1)
    };

    let num: i64 = num
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration: {}", duration_str))?;
    let secs = num
        .checked_mul(multiplier)
        .with_context(|| format!("Duration out of range: {}", duration_str))?;

    Ok(if negative { -secs } else { secs })
}

impl CleanerConfig {
    /// Build the validated policy this configuration describes
    ///
    /// Negative sizes or intervals and out-of-range buffers fail with the
    /// corresponding [`crate::eviction::PolicyError`].
    pub fn to_policy(&self) -> Result<CachePolicy> {
        if self.dir.is_empty() {
            anyhow::bail!("cleaner.dir must be set");
        }

        let policy = CachePolicy::from_signed(
            &self.dir,
            self.max_size.as_size()?,
            self.buffer_percent,
            self.interval.as_secs()?,
        )?;

        Ok(policy)
    }

    /// Delay before the first start
    pub fn start_delay(&self) -> Result<Duration> {
        let secs = self.start_delay.as_secs()?;
        let secs = u64::try_from(secs)
            .map_err(|_| anyhow::anyhow!("cleaner.start_delay must be 0 or greater, got {}", secs))?;
        Ok(Duration::from_secs(secs))
    }
}

impl CleanerAppConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: CleanerAppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.cleaner.to_policy()?;
        self.cleaner.start_delay()?;

        if let Some(level) = &self.log.level {
            if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
                anyhow::bail!("log.level must be one of: trace, debug, info, warn, error");
            }
        }

        Ok(())
    }

    /// Generate example configuration as TOML string
    pub fn example() -> String {
        let config = CleanerAppConfig {
            cleaner: CleanerConfig {
                dir: "/var/cache/my-app".to_string(),
                max_size: "500MB".into(),
                buffer_percent: 10,
                interval: "5m".into(),
                start_delay: "30s".into(),
            },
            log: LogConfig {
                level: Some("info".to_string()),
            },
        };

        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
