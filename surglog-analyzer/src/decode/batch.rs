//! Whole-file decoding
//!
//! Applies key selection, per-line error accounting and the timestamp
//! fallback to the content of one log file.

use super::line::{decode_line_lenient, DecodeError};
use super::recovery::{select_key, KeyCandidate, KeyPair, KeyTracker, NoPlausibleKey, SAMPLE_SIZE};
use crate::explain::ExplanationCatalog;
use crate::models::DecodedEvent;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Lines with per-line errors beyond this count are summarized, not logged
const MAX_LOGGED_LINE_ERRORS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogDecodeError {
    #[error("No plausible key: neither key decodes the first lines plausibly")]
    NoPlausibleKey,

    #[error("No valid entries: none of {lines} lines decoded")]
    NoValidEntries { lines: usize },
}

impl From<NoPlausibleKey> for LogDecodeError {
    fn from(_: NoPlausibleKey) -> Self {
        LogDecodeError::NoPlausibleKey
    }
}

/// Counters for one decoded file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    pub lines_seen: usize,
    pub decoded: usize,
    pub failed: usize,
    pub timestamp_fallbacks: usize,
    pub key_switches: usize,
    pub selected_key: Option<KeyCandidate>,
    /// Rejected lines by error kind
    pub errors: BTreeMap<String, usize>,
}

impl DecodeStats {
    fn count_error(&mut self, err: &DecodeError) {
        *self.errors.entry(err.kind().to_string()).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecodedLog {
    /// Events in file order
    pub events: Vec<DecodedEvent>,
    pub stats: DecodeStats,
}

/// Decodes file content with a fixed key pair and optional catalog
#[derive(Debug, Clone)]
pub struct LogDecoder {
    keys: KeyPair,
    catalog: Option<Arc<ExplanationCatalog>>,
}

impl LogDecoder {
    pub fn new(keys: KeyPair) -> Self {
        Self { keys, catalog: None }
    }

    pub fn with_catalog(mut self, catalog: Arc<ExplanationCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Decode all lines, using the current wall-clock time for bad timestamps
    pub fn decode(&self, content: &str) -> Result<DecodedLog, LogDecodeError> {
        self.decode_at(content, surglog_common::time::now())
    }

    /// Decode all lines; `now` replaces timestamps that fail to parse.
    ///
    /// Blank lines are skipped without counting. Content with no lines at all
    /// yields an empty log.
    pub fn decode_at(&self, content: &str, now: NaiveDateTime) -> Result<DecodedLog, LogDecodeError> {
        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let mut stats = DecodeStats::default();
        if lines.is_empty() {
            return Ok(DecodedLog { events: Vec::new(), stats });
        }

        let sample = &lines[..lines.len().min(SAMPLE_SIZE)];
        let selected = select_key(sample, &self.keys, now).map_err(|e| {
            warn!("Neither key decodes the first {} lines plausibly, skipping file", sample.len());
            LogDecodeError::from(e)
        })?;
        info!("Decoding {} lines with {:?} key", lines.len(), selected);

        let mut tracker = KeyTracker::new(self.keys.clone(), selected);
        let mut events = Vec::with_capacity(lines.len());

        for (idx, line) in lines.iter().enumerate() {
            stats.lines_seen += 1;

            let decoded = match decode_line_lenient(line, tracker.current_key(), now) {
                Ok(d) => d,
                Err(e) => {
                    stats.failed += 1;
                    stats.count_error(&e);
                    if stats.failed <= MAX_LOGGED_LINE_ERRORS {
                        debug!("Line {} skipped: {}", idx + 1, e);
                    }
                    continue;
                }
            };

            if let Some(err) = &decoded.timestamp_error {
                stats.timestamp_fallbacks += 1;
                stats.count_error(err);
            }

            let mut event = match tracker.on_boundary(line, &decoded.event, now) {
                Some(redecoded) => redecoded,
                None => decoded.event,
            };

            if let Some(catalog) = &self.catalog {
                if let Some(text) = catalog.explain(&event) {
                    event.explanation = text;
                }
            }

            stats.decoded += 1;
            events.push(event);
        }

        stats.key_switches = tracker.switches();
        stats.selected_key = Some(tracker.selected());

        if stats.failed > MAX_LOGGED_LINE_ERRORS {
            warn!("{} lines skipped ({:?})", stats.failed, stats.errors);
        }

        if events.is_empty() {
            warn!("None of {} lines decoded", stats.lines_seen);
            return Err(LogDecodeError::NoValidEntries { lines: stats.lines_seen });
        }

        info!(
            "Decoded {}/{} lines ({} timestamp fallbacks, {} key switches)",
            stats.decoded, stats.lines_seen, stats.timestamp_fallbacks, stats.key_switches
        );
        Ok(DecodedLog { events, stats })
    }
}
