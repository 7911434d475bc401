//! Device key derivation
//!
//! The human-entered key (`XX-XX-XX-XX-XX-XX`) is turned into an 8-byte
//! decode key by picking fixed character positions. The first four bytes
//! mask the error code, the last four mask each parameter.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minimum number of source bytes the derivation indexes into
pub const MIN_KEY_SOURCE_LEN: usize = 17;

/// XOR applied to the code-mask bytes
const CODE_MASK_XOR: u8 = 211;

/// Source positions of the code-mask bytes
const CODE_MASK_POSITIONS: [usize; 4] = [7, 4, 11, 16];

/// Source positions of the parameter-mask bytes
const PARAM_MASK_POSITIONS: [usize; 4] = [15, 9, 12, 10];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Invalid key length: need at least 17 characters, got {0}")]
    InvalidKeyLength(usize),
}

/// Derived 8-byte decode key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DecodeKey([u8; 8]);

impl DecodeKey {
    /// Derive a decode key from its textual form.
    ///
    /// `-` separators are normalized to `:` before indexing; the characters
    /// are used as raw bytes, not parsed as hex.
    pub fn derive(source: &str) -> Result<Self, KeyError> {
        let normalized = source.replace('-', ":");
        let bytes = normalized.as_bytes();
        if bytes.len() < MIN_KEY_SOURCE_LEN {
            return Err(KeyError::InvalidKeyLength(bytes.len()));
        }

        let mut key = [0u8; 8];
        for (slot, &pos) in CODE_MASK_POSITIONS.iter().enumerate() {
            key[slot] = bytes[pos] ^ CODE_MASK_XOR;
        }
        for (slot, &pos) in PARAM_MASK_POSITIONS.iter().enumerate() {
            key[4 + slot] = bytes[pos];
        }
        Ok(Self(key))
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Mask for the error-code field
    pub fn code_mask(&self) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], self.0[3]]
    }

    /// Mask for each parameter field
    pub fn param_mask(&self) -> [u8; 4] {
        [self.0[4], self.0[5], self.0[6], self.0[7]]
    }
}

impl FromStr for DecodeKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::derive(s)
    }
}

// Key bytes are secret-ish; keep them out of logs
impl fmt::Debug for DecodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecodeKey(..)")
    }
}
