//! Structured logging for cache-cleaner
//!
//! All logs use structured fields for easy parsing and analysis.
//!
//! # Log Format Conventions
//!
//! - `operation`: The operation being performed (e.g., "session", "evict")
//! - `status`: The result status ("success", "cancelled", "error")
//! - `path`: Filesystem path the event is about
//! - `bytes_removed`: Bytes deleted by the operation
//!
//! # Examples
//!
//! ```rust
//! use tracing::info;
//! # let root = std::path::Path::new("/var/cache/app");
//! # let removed = 0u64;
//!
//! info!(
//!     operation = "session",
//!     status = "success",
//!     path = %root.display(),
//!     bytes_removed = removed,
//!     "cleaning session finished"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Custom formatter that shows "cache-cleaner" instead of full module path
struct CleanerFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for CleanerFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m", // Red
                tracing::Level::WARN => "\x1b[33m",  // Yellow
                tracing::Level::INFO => "\x1b[32m",  // Green
                tracing::Level::DEBUG => "\x1b[34m", // Blue
                tracing::Level::TRACE => "\x1b[35m", // Magenta
            };
            write!(
                writer,
                "{}{:5}(cache-cleaner)\x1b[0m: ",
                level_style,
                meta.level()
            )?;
        } else {
            write!(writer, "{:5}(cache-cleaner): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    Pretty,
    /// Compact format (for CI/production)
    Compact,
    /// JSON format (for log aggregation systems)
    Json,
}

impl LogFormat {
    /// Parse a format name; unknown names fall back to the environment default
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ => {
                // Default: pretty for dev, compact for production/CI
                if std::env::var("CI").is_ok() {
                    Self::Compact
                } else {
                    Self::Pretty
                }
            }
        }
    }

    /// Parse from environment variable (CACHE_CLEANER_LOG_FORMAT)
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("CACHE_CLEANER_LOG_FORMAT").unwrap_or_default())
    }
}

/// Initialize the global tracing subscriber
///
/// `default_level` is used when `RUST_LOG` is not set; without either the
/// level is `info`. Calling this twice is harmless: the second call leaves
/// the first subscriber in place.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "debug", "info", "warn")
/// - `CACHE_CLEANER_LOG_FORMAT`: Set format ("pretty", "compact", "json")
/// - `CI`: If set, defaults to compact format
///
/// # Examples
///
/// ```bash
/// # Pretty format with debug logs
/// RUST_LOG=debug cache-cleaner clean --dir /var/cache/app
///
/// # JSON format for production
/// CACHE_CLEANER_LOG_FORMAT=json cache-cleaner watch
/// ```
pub fn init(default_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match LogFormat::from_env() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(CleanerFormatter { with_ansi: true })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(CleanerFormatter { with_ansi: false })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}

/// Operation names for consistent logging
pub mod operations {
    pub const SESSION: &str = "session";
    pub const EVICT: &str = "evict";
    pub const PURGE: &str = "purge";
    pub const SIZE: &str = "size";
}

/// Status values for consistent logging
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const CANCELLED: &str = "cancelled";
    pub const ERROR: &str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_format() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
    }
}
