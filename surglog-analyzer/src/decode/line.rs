//! Single-line decoder
//!
//! Line format: `<timestamp> <code> <p1> <p2> <p3> <p4>` where the last five
//! fields are 32-bit hex values. The timestamp is either the controller
//! literal `DT#YYYY-MM-DD-HH:MM:SS` or a normalized `YYYY-MM-DD HH:MM:SS`,
//! which occupies two whitespace-separated fields.

use super::key::DecodeKey;
use crate::models::DecodedEvent;
use chrono::NaiveDateTime;
use surglog_common::time::{parse_log_timestamp, DT_LITERAL_PREFIX};
use thiserror::Error;

/// Raw parameter value meaning "zero" under any key
pub const PARAM_SENTINEL: u32 = 0xA16D_768E;

/// Decrypted state-transition code and the form it is reported as
const SHORT_STATE_CODE: &str = "310e";
const FULL_STATE_CODE: &str = "100310e";

const FIELD_NAMES: [&str; 5] = ["error_code", "param1", "param2", "param3", "param4"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Malformed line: expected a timestamp and 5 hex fields, got {fields} fields")]
    MalformedLine { fields: usize },

    #[error("Malformed line: non-ASCII content")]
    NonAsciiLine,

    #[error("Invalid hex in {field}: '{value}'")]
    InvalidHexField { field: &'static str, value: String },

    #[error("Invalid timestamp: '{raw}'")]
    InvalidTimestamp { raw: String },
}

impl DecodeError {
    /// Stable short name, used as a counter key
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::MalformedLine { .. } | DecodeError::NonAsciiLine => "malformed_line",
            DecodeError::InvalidHexField { .. } => "invalid_hex_field",
            DecodeError::InvalidTimestamp { .. } => "invalid_timestamp",
        }
    }
}

/// Result of a lenient decode: a bad timestamp does not reject the line
#[derive(Debug, Clone, PartialEq)]
pub struct LenientDecode {
    pub event: DecodedEvent,
    /// Set when the timestamp failed to parse and `fallback_time` was used
    pub timestamp_error: Option<DecodeError>,
}

struct Fields<'a> {
    timestamp: String,
    hex: [&'a str; 5],
}

/// Decode one line. Any field error rejects the line.
pub fn decode_line(line: &str, key: &DecodeKey) -> Result<DecodedEvent, DecodeError> {
    let fields = split_fields(line)?;
    let (code, params) = decrypt_fields(&fields.hex, key)?;
    let timestamp = parse_timestamp(&fields.timestamp)?;
    Ok(DecodedEvent::new(timestamp, code, params))
}

/// Decode one line, substituting `fallback_time` for an unparseable
/// timestamp. Shape and hex errors still reject the line.
pub fn decode_line_lenient(
    line: &str,
    key: &DecodeKey,
    fallback_time: NaiveDateTime,
) -> Result<LenientDecode, DecodeError> {
    let fields = split_fields(line)?;
    let (code, params) = decrypt_fields(&fields.hex, key)?;
    let (timestamp, timestamp_error) = match parse_timestamp(&fields.timestamp) {
        Ok(ts) => (ts, None),
        Err(e) => (fallback_time, Some(e)),
    };
    Ok(LenientDecode {
        event: DecodedEvent::new(timestamp, code, params),
        timestamp_error,
    })
}

/// Decrypt an error-code field into its lowercase, unpadded hex form
pub fn decrypt_error_code(raw: u32, key: &DecodeKey) -> String {
    let mask = key.code_mask();
    let b = raw.to_be_bytes();
    let d = [b[0] ^ mask[0], b[1] ^ mask[1], b[2] ^ mask[2], b[3] ^ mask[3]];
    let value = u32::from_be_bytes([d[0], d[3], d[1], d[2]]);

    let code = format!("{:x}", value);
    if code == SHORT_STATE_CODE {
        FULL_STATE_CODE.to_string()
    } else {
        code
    }
}

/// Decrypt one parameter field
pub fn decrypt_param(raw: u32, key: &DecodeKey) -> i32 {
    if raw == PARAM_SENTINEL {
        return 0;
    }
    let mask = key.param_mask();
    let b = raw.to_be_bytes();
    i32::from_be_bytes([b[0] ^ mask[0], b[1] ^ mask[1], b[2] ^ mask[2], b[3] ^ mask[3]])
}

fn split_fields(line: &str) -> Result<Fields<'_>, DecodeError> {
    if !line.is_ascii() {
        return Err(DecodeError::NonAsciiLine);
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();

    // "YYYY-MM-DD HH:MM:SS" spans two tokens
    let split_time = tokens.len() >= 2
        && !tokens[0].starts_with(DT_LITERAL_PREFIX)
        && is_clock_time(tokens[1]);
    let needed = if split_time { 7 } else { 6 };
    if tokens.len() < needed {
        return Err(DecodeError::MalformedLine { fields: tokens.len() });
    }

    let (timestamp, rest) = if split_time {
        (format!("{} {}", tokens[0], tokens[1]), &tokens[2..7])
    } else {
        (tokens[0].to_string(), &tokens[1..6])
    };

    Ok(Fields {
        timestamp,
        hex: [rest[0], rest[1], rest[2], rest[3], rest[4]],
    })
}

fn is_clock_time(token: &str) -> bool {
    let b = token.as_bytes();
    b.len() == 8
        && b[2] == b':'
        && b[5] == b':'
        && [0, 1, 3, 4, 6, 7].iter().all(|&i| b[i].is_ascii_digit())
}

fn decrypt_fields(hex: &[&str; 5], key: &DecodeKey) -> Result<(String, [i32; 4]), DecodeError> {
    let mut raw = [0u32; 5];
    for (i, field) in hex.iter().enumerate() {
        raw[i] = parse_hex_field(field, FIELD_NAMES[i])?;
    }

    let code = decrypt_error_code(raw[0], key);
    let params = [
        decrypt_param(raw[1], key),
        decrypt_param(raw[2], key),
        decrypt_param(raw[3], key),
        decrypt_param(raw[4], key),
    ];
    Ok((code, params))
}

fn parse_hex_field(value: &str, field: &'static str) -> Result<u32, DecodeError> {
    let invalid = || DecodeError::InvalidHexField {
        field,
        value: value.to_string(),
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    u32::from_str_radix(value, 16).map_err(|_| invalid())
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, DecodeError> {
    parse_log_timestamp(raw).map_err(|_| DecodeError::InvalidTimestamp { raw: raw.to_string() })
}
