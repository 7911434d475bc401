//! # surglog Common Library
//!
//! Shared code for the surglog crates:
//! - Error type
//! - Configuration loading (TOML bootstrap, CLI/ENV/TOML/default resolution)
//! - Log timestamp parsing and storage formatting
//! - Human-readable duration formatting

pub mod config;
pub mod error;
pub mod human_time;
pub mod time;

pub use error::{Error, Result};
