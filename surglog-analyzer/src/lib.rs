//! surglog-analyzer library interface
//!
//! Decodes encrypted surgical-robot controller logs and reconstructs the
//! surgeries they record.
//!
//! - [`decode`]: key derivation, line cipher, key recovery, file decoding
//! - [`explain`]: error-code explanation templates
//! - [`analyzer`]: event stream → [`Surgery`](models::Surgery) records
//! - [`projection`]: surgery → storage row
//! - [`pipeline`]: the above, end to end, for one file

pub mod analyzer;
pub mod decode;
pub mod explain;
pub mod models;
pub mod pipeline;
pub mod projection;

pub use analyzer::{SurgeryAnalyzer, ANALYZER_VERSION};
pub use decode::{DecodeKey, KeyPair, LogDecodeError, LogDecoder};
pub use models::{DecodedEvent, Surgery};
pub use pipeline::{LogPipeline, PipelineError, PipelineOptions, PipelineReport};
pub use projection::{PostgresProjector, SurgeryRow};
