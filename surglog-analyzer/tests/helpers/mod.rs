//! Shared helpers for surglog-analyzer integration tests
//!
//! - Line encryptor inverting the controller cipher
//! - [`LogBuilder`]: encrypted log text from (time, code, params) records
//! - [`Script`]: decoded event sequences with a moving clock

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use surglog_analyzer::decode::DecodeKey;
use surglog_analyzer::DecodedEvent;

/// Built-in fallback key
pub const FALLBACK_KEY: &str = "00-01-05-6E-F0-22";

/// Device key sharing the fallback's code mask but not its parameter mask,
/// so lines under the wrong key decode to the right codes with huge params
pub const DEVICE_KEY: &str = "00-01-05-44-55-62";

/// Key matching neither of the above
pub const FOREIGN_KEY: &str = "AA-BB-CC-DD-EE-FF";

pub fn key(source: &str) -> DecodeKey {
    DecodeKey::derive(source).unwrap()
}

/// 2024-03-01 at the given wall-clock time
pub fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

// ========================================
// Encryption
// ========================================

pub fn encrypt_code(value: u32, key: &DecodeKey) -> u32 {
    let m = key.code_mask();
    let d = [
        (value >> 24) as u8,
        (value >> 8) as u8,
        value as u8,
        (value >> 16) as u8,
    ];
    u32::from_be_bytes([d[0] ^ m[0], d[1] ^ m[1], d[2] ^ m[2], d[3] ^ m[3]])
}

pub fn encrypt_param(value: i32, key: &DecodeKey) -> u32 {
    let m = key.param_mask();
    let b = value.to_be_bytes();
    u32::from_be_bytes([b[0] ^ m[0], b[1] ^ m[1], b[2] ^ m[2], b[3] ^ m[3]])
}

/// One encrypted line with a `DT#` timestamp
pub fn encrypt_line(ts: NaiveDateTime, code: u32, params: [i32; 4], key: &DecodeKey) -> String {
    format!(
        "{} {:08X} {:08X} {:08X} {:08X} {:08X}",
        ts.format("DT#%Y-%m-%d-%H:%M:%S"),
        encrypt_code(code, key),
        encrypt_param(params[0], key),
        encrypt_param(params[1], key),
        encrypt_param(params[2], key),
        encrypt_param(params[3], key)
    )
}

/// Accumulates encrypted lines; each line may use its own key
pub struct LogBuilder {
    key: DecodeKey,
    lines: Vec<String>,
}

impl LogBuilder {
    pub fn new(key_source: &str) -> Self {
        Self {
            key: key(key_source),
            lines: Vec::new(),
        }
    }

    pub fn line(mut self, ts: NaiveDateTime, code: u32, params: [i32; 4]) -> Self {
        self.lines.push(encrypt_line(ts, code, params, &self.key));
        self
    }

    pub fn line_with_key(mut self, ts: NaiveDateTime, code: u32, params: [i32; 4], key_source: &str) -> Self {
        self.lines.push(encrypt_line(ts, code, params, &key(key_source)));
        self
    }

    /// Verbatim text, e.g. a deliberately broken line
    pub fn raw(mut self, text: &str) -> Self {
        self.lines.push(text.to_string());
        self
    }

    pub fn build(self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

// ========================================
// Event scripts
// ========================================

/// Decoded events on a clock that only moves forward
pub struct Script {
    now: NaiveDateTime,
    events: Vec<DecodedEvent>,
}

impl Script {
    pub fn starting_at(now: NaiveDateTime) -> Self {
        Self {
            now,
            events: Vec::new(),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn wait(&mut self, secs: i64) -> &mut Self {
        self.now += Duration::seconds(secs);
        self
    }

    pub fn wait_mins(&mut self, mins: i64) -> &mut Self {
        self.wait(mins * 60)
    }

    pub fn emit(&mut self, code: &str, params: [i32; 4]) -> &mut Self {
        self.events.push(DecodedEvent::new(self.now, code, params));
        self
    }

    pub fn power_on(&mut self) -> &mut Self {
        self.emit("a01e", [0; 4])
    }

    pub fn power_off(&mut self) -> &mut Self {
        self.emit("a02e", [0; 4])
    }

    pub fn state(&mut self, from: i32, to: i32) -> &mut Self {
        self.emit("100310e", [from, to, 0, 0])
    }

    /// `500e` for a 0-based arm
    pub fn arm_state(&mut self, arm: i32, from: i32, to: i32) -> &mut Self {
        self.emit("1000500e", [arm, from, to, 0])
    }

    pub fn instrument_type(&mut self, arm: i32, instrument_type: i32) -> &mut Self {
        self.emit("1000501e", [arm, 0, instrument_type, 0])
    }

    /// Event whose code carries the 0-based arm in its second digit
    pub fn arm_event(&mut self, arm: usize, suffix: &str, params: [i32; 4]) -> &mut Self {
        let code = format!("1{}00{}", arm + 3, suffix);
        self.emit(&code, params)
    }

    pub fn udi(&mut self, arm: usize, params: [i32; 4]) -> &mut Self {
        self.arm_event(arm, "510e", params)
    }

    /// Filler event with no analyzer meaning
    pub fn noise(&mut self) -> &mut Self {
        self.emit("1000520e", [0; 4])
    }

    pub fn events(&self) -> Vec<DecodedEvent> {
        self.events.clone()
    }
}
