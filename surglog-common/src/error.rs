//! Common error types for surglog

use thiserror::Error;

/// Common result type for surglog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across surglog crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error in a configuration or catalog file
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid user input (malformed timestamp, unknown option value)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
