//! Human-readable sizes, durations and percentages for run summaries.

use std::time::Duration;

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Formats a byte count using binary units, e.g. `1.50 MB`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Formats an elapsed time as `4.2s`, `3m 07s` or `2h 00m 41s`.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{s}.{}s", d.subsec_millis() / 100),
        (0, _) => format!("{m}m {s:02}s"),
        _ => format!("{h}h {m:02}m {s:02}s"),
    }
}

/// Formats a progress ratio as a whole percentage, clamped to `0%..=100%`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn format_percent(ratio: f64) -> String {
    let pct = if ratio.is_nan() {
        0.0
    } else {
        (ratio * 100.0).clamp(0.0, 100.0)
    };
    format!("{}%", pct.floor() as u8)
}
