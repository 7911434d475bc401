//! Timestamp utilities
//!
//! Controller logs carry wall-clock device time without a zone, so every
//! timestamp in surglog is a `NaiveDateTime`.

use crate::{Error, Result};
use chrono::{Local, NaiveDateTime};

/// Prefix of the controller's literal date-time form (`DT#YYYY-MM-DD-HH:MM:SS`)
pub const DT_LITERAL_PREFIX: &str = "DT#";

/// Storage/display format (`YYYY-MM-DD HH:MM:SS`)
pub const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Compact format used inside surgery identifiers (`YYYYMMDDHHMM`)
pub const ID_FORMAT: &str = "%Y%m%d%H%M";

const ACCEPTED_FORMATS: [&str; 3] = [STORAGE_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Get current local wall-clock time
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Parse a log timestamp.
///
/// Accepts the controller literal `DT#2024-03-01-08:15:00` and the already
/// normalized `2024-03-01 08:15:00` (or ISO `T`-separated) form.
pub fn parse_log_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();

    if let Some(literal) = raw.strip_prefix(DT_LITERAL_PREFIX) {
        return NaiveDateTime::parse_from_str(literal, "%Y-%m-%d-%H:%M:%S")
            .map_err(|e| Error::InvalidInput(format!("timestamp '{}': {}", raw, e)));
    }

    ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| Error::InvalidInput(format!("unrecognized timestamp '{}'", raw)))
}

/// Format a timestamp for storage rows
pub fn format_storage_time(ts: &NaiveDateTime) -> String {
    ts.format(STORAGE_FORMAT).to_string()
}

/// Format a timestamp for use in a surgery identifier
pub fn format_id_time(ts: &NaiveDateTime) -> String {
    ts.format(ID_FORMAT).to_string()
}

/// Whole seconds from `from` to `to` (negative when `to` is earlier)
pub fn seconds_between(from: &NaiveDateTime, to: &NaiveDateTime) -> i64 {
    (*to - *from).num_seconds()
}
