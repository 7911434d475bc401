//! Key recovery heuristic
//!
//! Devices are sometimes logged under a generic factory key instead of their
//! own. The heuristic trial-decodes the head of a file with both keys and
//! keeps whichever produces plausible parameters, then re-checks at every
//! power boundary because a device may change keys across a reboot.

use super::key::{DecodeKey, KeyError};
use super::line::decode_line_lenient;
use crate::models::DecodedEvent;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{info, warn};

/// Largest parameter magnitude a correctly decoded line produces
pub const PLAUSIBILITY_LIMIT: i64 = 2_000_000;

/// Lines trial-decoded when selecting a key
pub const SAMPLE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCandidate {
    /// Key supplied by the operator or configuration
    User,
    /// Factory fallback key
    Fallback,
}

impl KeyCandidate {
    pub fn other(self) -> Self {
        match self {
            KeyCandidate::User => KeyCandidate::Fallback,
            KeyCandidate::Fallback => KeyCandidate::User,
        }
    }
}

/// Every parameter within `±PLAUSIBILITY_LIMIT`
pub fn is_plausible(event: &DecodedEvent) -> bool {
    event
        .params()
        .iter()
        .all(|p| (*p as i64).abs() <= PLAUSIBILITY_LIMIT)
}

/// Both candidate keys. The user key is optional: a missing or underivable
/// key string counts as never plausible.
#[derive(Debug, Clone)]
pub struct KeyPair {
    user: Option<DecodeKey>,
    fallback: DecodeKey,
}

impl KeyPair {
    pub fn new(user: Option<DecodeKey>, fallback: DecodeKey) -> Self {
        Self { user, fallback }
    }

    /// Derive both keys from their textual forms.
    ///
    /// A bad user key is logged and dropped; a bad fallback key is an error.
    pub fn from_strings(user: Option<&str>, fallback: &str) -> Result<Self, KeyError> {
        let fallback = DecodeKey::derive(fallback)?;
        let user = match user.map(DecodeKey::derive) {
            Some(Ok(key)) => Some(key),
            Some(Err(e)) => {
                warn!("Device key rejected ({}), only the fallback key will be tried", e);
                None
            }
            None => None,
        };
        Ok(Self { user, fallback })
    }

    pub fn get(&self, candidate: KeyCandidate) -> Option<&DecodeKey> {
        match candidate {
            KeyCandidate::User => self.user.as_ref(),
            KeyCandidate::Fallback => Some(&self.fallback),
        }
    }
}

/// Neither key decodes the sample plausibly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoPlausibleKey;

/// Whether `key` decodes every decodable sample line plausibly.
///
/// Returns `None` when no sample line decodes at all.
fn sample_plausibility(sample: &[&str], key: &DecodeKey, now: NaiveDateTime) -> Option<bool> {
    let mut decoded = 0usize;
    let mut plausible = true;
    for line in sample {
        if let Ok(d) = decode_line_lenient(line, key, now) {
            decoded += 1;
            plausible &= is_plausible(&d.event);
        }
    }
    (decoded > 0).then_some(plausible)
}

/// Choose the key for a file from its first lines.
///
/// | user plausible | fallback plausible | result |
/// |---|---|---|
/// | yes | any | `User` |
/// | no | yes | `Fallback` |
/// | no | no | `NoPlausibleKey` |
///
/// A sample in which nothing decodes keeps the user key (or the fallback
/// when there is none); the per-line errors surface later.
pub fn select_key(
    sample: &[&str],
    keys: &KeyPair,
    now: NaiveDateTime,
) -> Result<KeyCandidate, NoPlausibleKey> {
    let sample = &sample[..sample.len().min(SAMPLE_SIZE)];

    let user = keys.user.as_ref().map(|k| sample_plausibility(sample, k, now));
    let fallback = sample_plausibility(sample, &keys.fallback, now);

    match (user, fallback) {
        (Some(Some(true)), _) => Ok(KeyCandidate::User),
        (Some(None), None) => Ok(KeyCandidate::User),
        (None, None) => Ok(KeyCandidate::Fallback),
        (_, Some(true)) => {
            if keys.user.is_some() {
                warn!("Device key produced implausible values, switched to fallback key");
            } else {
                info!("Using fallback key");
            }
            Ok(KeyCandidate::Fallback)
        }
        _ => Err(NoPlausibleKey),
    }
}

/// Tracks the key in force while a file is decoded
#[derive(Debug, Clone)]
pub struct KeyTracker {
    keys: KeyPair,
    selected: KeyCandidate,
    current: KeyCandidate,
    switches: usize,
}

impl KeyTracker {
    pub fn new(keys: KeyPair, selected: KeyCandidate) -> Self {
        Self {
            keys,
            selected,
            current: selected,
            switches: 0,
        }
    }

    pub fn selected(&self) -> KeyCandidate {
        self.selected
    }

    pub fn current(&self) -> KeyCandidate {
        self.current
    }

    /// Times the key in force changed during the decode
    pub fn switches(&self) -> usize {
        self.switches
    }

    /// Key in force. Falls back to the fallback key when the user key is
    /// unavailable.
    pub fn current_key(&self) -> &DecodeKey {
        self.keys
            .get(self.current)
            .unwrap_or(&self.keys.fallback)
    }

    /// Re-check the key on a power boundary line.
    ///
    /// `decoded` is the line decoded with the current key. Returns the
    /// re-decoded event when the other key is used for it. Power-off lines
    /// restore the originally selected key afterwards.
    pub fn on_boundary(
        &mut self,
        line: &str,
        decoded: &DecodedEvent,
        now: NaiveDateTime,
    ) -> Option<DecodedEvent> {
        let power_on = decoded.is_power_on_candidate();
        let power_off = decoded.is_power_off_candidate();
        if !power_on && !power_off {
            return None;
        }

        let mut redecoded = None;
        if !is_plausible(decoded) {
            let other = self.current.other();
            if let Some(key) = self.keys.get(other) {
                if let Ok(d) = decode_line_lenient(line, key, now) {
                    info!(
                        "Key switched to {:?} at {} boundary ({})",
                        other,
                        if power_on { "power-on" } else { "power-off" },
                        d.event.timestamp
                    );
                    self.set_current(other);
                    redecoded = Some(d.event);
                }
            }
        }

        if power_off {
            self.set_current(self.selected);
        }
        redecoded
    }

    fn set_current(&mut self, candidate: KeyCandidate) {
        if self.current != candidate {
            self.current = candidate;
            self.switches += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn ev(params: [i32; 4]) -> DecodedEvent {
        DecodedEvent::new(now(), "1000520e", params)
    }

    #[test]
    fn test_plausibility_bound() {
        assert!(is_plausible(&ev([2_000_000, -2_000_000, 0, 0])));
        assert!(!is_plausible(&ev([2_000_001, 0, 0, 0])));
        assert!(!is_plausible(&ev([0, 0, 0, i32::MIN])));
    }

    #[test]
    fn test_candidate_other() {
        assert_eq!(KeyCandidate::User.other(), KeyCandidate::Fallback);
        assert_eq!(KeyCandidate::Fallback.other(), KeyCandidate::User);
    }

    #[test]
    fn test_bad_user_key_is_dropped() {
        let keys = KeyPair::from_strings(Some("short"), "00-01-05-6E-F0-22").unwrap();
        assert!(keys.get(KeyCandidate::User).is_none());
        assert!(keys.get(KeyCandidate::Fallback).is_some());
    }

    #[test]
    fn test_bad_fallback_key_is_error() {
        assert!(KeyPair::from_strings(None, "00-01").is_err());
    }

    #[test]
    fn test_empty_sample_keeps_user_key() {
        let keys = KeyPair::from_strings(Some("11-22-33-44-55-66"), "00-01-05-6E-F0-22").unwrap();
        assert_eq!(select_key(&[], &keys, now()), Ok(KeyCandidate::User));
        assert_eq!(
            select_key(&["garbage"], &keys, now()),
            Ok(KeyCandidate::User)
        );

        let fallback_only = KeyPair::from_strings(None, "00-01-05-6E-F0-22").unwrap();
        assert_eq!(select_key(&[], &fallback_only, now()), Ok(KeyCandidate::Fallback));
    }

    #[test]
    fn test_tracker_without_user_key_uses_fallback() {
        let keys = KeyPair::from_strings(None, "00-01-05-6E-F0-22").unwrap();
        let tracker = KeyTracker::new(keys.clone(), KeyCandidate::User);
        assert_eq!(tracker.current_key(), keys.get(KeyCandidate::Fallback).unwrap());
    }

    #[test]
    fn test_non_boundary_line_is_ignored() {
        let keys = KeyPair::from_strings(Some("11-22-33-44-55-66"), "00-01-05-6E-F0-22").unwrap();
        let mut tracker = KeyTracker::new(keys, KeyCandidate::User);
        let implausible = ev([i32::MAX, 0, 0, 0]);
        assert!(tracker.on_boundary("ignored", &implausible, now()).is_none());
        assert_eq!(tracker.switches(), 0);
    }
}
