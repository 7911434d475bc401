//! Log decryption and decoding
//!
//! - [`key`]: key string → 8-byte decode key
//! - [`line`]: one raw line → [`DecodedEvent`](crate::models::DecodedEvent)
//! - [`recovery`]: user/fallback key selection and boundary re-checks
//! - [`batch`]: whole-file decoding with error accounting

pub mod batch;
pub mod key;
pub mod line;
pub mod recovery;

pub use batch::{DecodeStats, DecodedLog, LogDecodeError, LogDecoder};
pub use key::{DecodeKey, KeyError};
pub use line::{decode_line, decode_line_lenient, DecodeError};
pub use recovery::{is_plausible, select_key, KeyCandidate, KeyPair};
