//! Decoded controller event

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Suffix of the dedicated power-on code
pub const POWER_ON_SUFFIX: &str = "a01e";
/// Suffix of the alternate power-on report (`p1 == 0 && p2 != 0`)
pub const POWER_ON_ALT_SUFFIX: &str = "570e";
/// Suffix of the dedicated power-off code
pub const POWER_OFF_SUFFIX: &str = "a02e";
/// Suffix of controller state-machine transitions (`p1` = from, `p2` = to)
pub const STATE_CHANGE_SUFFIX: &str = "310e";
/// State-machine state meaning "shutting down"
pub const STATE_SHUTDOWN: i32 = 31;

/// One decoded log line. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Device wall-clock time of the record
    pub timestamp: NaiveDateTime,
    /// Decrypted code, lowercase hex without zero padding
    pub error_code: String,
    pub param1: i32,
    pub param2: i32,
    pub param3: i32,
    pub param4: i32,
    /// Human-readable description
    pub explanation: String,
}

impl DecodedEvent {
    /// Build an event with the default explanation text
    pub fn new(timestamp: NaiveDateTime, error_code: impl Into<String>, params: [i32; 4]) -> Self {
        let error_code = error_code.into();
        let explanation = default_explanation(&error_code, &params);
        Self {
            timestamp,
            error_code,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            explanation,
        }
    }

    pub fn params(&self) -> [i32; 4] {
        [self.param1, self.param2, self.param3, self.param4]
    }

    /// Last four hex characters of the code; selects the event's meaning
    pub fn suffix(&self) -> &str {
        let code = self.error_code.as_str();
        code.get(code.len().saturating_sub(4)..).unwrap_or(code)
    }

    /// First hex character: originating controller subsystem
    pub fn subsystem(&self) -> Option<char> {
        self.error_code.chars().next()
    }

    /// Arm encoded in the code's second hex digit (digit − 3, valid 0..=3)
    pub fn code_arm_index(&self) -> Option<usize> {
        let digit = self.error_code.chars().nth(1)?.to_digit(16)? as i64;
        let arm = digit - 3;
        (0..4).contains(&arm).then_some(arm as usize)
    }

    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.suffix().eq_ignore_ascii_case(suffix)
    }

    /// Power-on record (`a01e`, or `570e` with `p1 == 0 && p2 != 0`)
    pub fn is_power_on_candidate(&self) -> bool {
        self.has_suffix(POWER_ON_SUFFIX)
            || (self.has_suffix(POWER_ON_ALT_SUFFIX) && self.param1 == 0 && self.param2 != 0)
    }

    /// Power-off record (`a02e`, or `310e` entering state 31).
    ///
    /// The analyzer additionally checks that a `310e` shutdown is not
    /// rescinded shortly after.
    pub fn is_power_off_candidate(&self) -> bool {
        self.has_suffix(POWER_OFF_SUFFIX)
            || (self.has_suffix(STATE_CHANGE_SUFFIX) && self.param2 == STATE_SHUTDOWN)
    }
}

fn default_explanation(code: &str, params: &[i32; 4]) -> String {
    format!(
        "Error Code: {}; Params: {}, {}, {}, {}",
        code, params[0], params[1], params[2], params[3]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(code: &str, params: [i32; 4]) -> DecodedEvent {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        DecodedEvent::new(ts, code, params)
    }

    #[test]
    fn test_suffix_and_subsystem() {
        let ev = event("100310e", [0; 4]);
        assert_eq!(ev.suffix(), "310e");
        assert_eq!(ev.subsystem(), Some('1'));

        let short = event("2e", [0; 4]);
        assert_eq!(short.suffix(), "2e");
    }

    #[test]
    fn test_code_arm_index() {
        assert_eq!(event("1300510e", [0; 4]).code_arm_index(), Some(0));
        assert_eq!(event("1600510e", [0; 4]).code_arm_index(), Some(3));
        assert_eq!(event("1700510e", [0; 4]).code_arm_index(), None);
        assert_eq!(event("1200510e", [0; 4]).code_arm_index(), None);
        assert_eq!(event("1a00510e", [0; 4]).code_arm_index(), None);
    }

    #[test]
    fn test_power_predicates() {
        assert!(event("a01e", [0; 4]).is_power_on_candidate());
        assert!(event("1000570e", [0, 3, 0, 0]).is_power_on_candidate());
        assert!(!event("1000570e", [1, 3, 0, 0]).is_power_on_candidate());
        assert!(!event("1000570e", [0, 0, 0, 0]).is_power_on_candidate());

        assert!(event("a02e", [0; 4]).is_power_off_candidate());
        assert!(event("100310e", [20, 31, 0, 0]).is_power_off_candidate());
        assert!(!event("100310e", [31, 20, 0, 0]).is_power_off_candidate());
    }

    #[test]
    fn test_default_explanation() {
        let ev = event("a01e", [1, -2, 3, 4]);
        assert_eq!(ev.explanation, "Error Code: a01e; Params: 1, -2, 3, 4");
    }
}
