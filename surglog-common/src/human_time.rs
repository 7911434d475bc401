//! Human-readable duration formatting for surgery summaries
//!
//! Durations in surgery records are whole seconds. Formats by magnitude:
//! - `< 60s`  → `45s`
//! - `< 1h`   → `5m 30s`
//! - `< 24h`  → `2h 05m`
//! - `>= 24h` → `1d 03h`

const MINUTE: i64 = 60;
const HOUR: i64 = 3600;
const DAY: i64 = 86400;

/// Format a duration in seconds.
///
/// # Examples
///
/// ```
/// use surglog_common::human_time::format_duration;
///
/// assert_eq!(format_duration(45), "45s");
/// assert_eq!(format_duration(330), "5m 30s");
/// assert_eq!(format_duration(7500), "2h 05m");
/// assert_eq!(format_duration(97200), "1d 03h");
/// ```
pub fn format_duration(seconds: i64) -> String {
    let is_negative = seconds < 0;
    let abs_seconds = seconds.abs();

    let formatted = if abs_seconds < MINUTE {
        format!("{}s", abs_seconds)
    } else if abs_seconds < HOUR {
        format!("{}m {:02}s", abs_seconds / MINUTE, abs_seconds % MINUTE)
    } else if abs_seconds < DAY {
        format!("{}h {:02}m", abs_seconds / HOUR, (abs_seconds % HOUR) / MINUTE)
    } else {
        format!("{}d {:02}h", abs_seconds / DAY, (abs_seconds % DAY) / HOUR)
    };

    if is_negative {
        format!("-{}", formatted)
    } else {
        formatted
    }
}

/// Format an optional duration; `None` renders as `n/a`
pub fn format_duration_opt(seconds: Option<i64>) -> String {
    seconds.map(format_duration).unwrap_or_else(|| "n/a".to_string())
}
