/// CLI utilities for consistent output formatting
use std::io::IsTerminal;

/// Get a colored prefix
///
/// Returns bright cyan if stderr is a TTY, plain text otherwise.
pub fn cleaner_prefix() -> &'static str {
    if std::io::stderr().is_terminal() {
        "\x1b[96m[cache-cleaner]\x1b[0m"
    } else {
        "[cache-cleaner]"
    }
}

const SIZE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Format a byte count with the largest binary unit that keeps it >= 1
/// (e.g. `1536` -> `"1.5 KB"`)
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", value, SIZE_UNITS[unit])
}
