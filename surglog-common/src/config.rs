//! Configuration loading and value resolution
//!
//! Bootstrap configuration is a small TOML file. Every value resolves in
//! the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Built-in default (fallback)
//!
//! A missing config file is not an error: a warning is logged and built-in
//! defaults are used. A config file that exists but does not parse is an
//! error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "SURGLOG_CONFIG";
/// Environment variable holding the device decrypt key
pub const ENV_KEY: &str = "SURGLOG_KEY";
/// Environment variable holding the device identifier
pub const ENV_DEVICE_ID: &str = "SURGLOG_DEVICE_ID";

/// Device key used when no key is configured anywhere
pub const DEFAULT_FALLBACK_KEY: &str = "00-01-05-6E-F0-22";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Device decrypt key (`XX-XX-XX-XX-XX-XX`)
    #[serde(default)]
    pub key: Option<String>,

    /// Key tried when the device key produces implausible output
    ///
    /// Default: `00-01-05-6E-F0-22`
    #[serde(default)]
    pub fallback_key: Option<String>,

    /// Device identifier used in projected surgery ids
    #[serde(default)]
    pub device_id: Option<String>,

    /// Path to an explanation catalog (error code → template table)
    #[serde(default)]
    pub explanation_catalog: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Fallback key with the built-in default applied
    pub fn fallback_key_or_default(&self) -> &str {
        self.fallback_key.as_deref().unwrap_or(DEFAULT_FALLBACK_KEY)
    }
}

/// Locate the config file.
///
/// Priority: explicit path → `SURGLOG_CONFIG` → `~/.config/surglog/config.toml`
/// (only if it exists). Returns `None` when nothing applies.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(ENV_CONFIG) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|p| p.exists())
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("surglog").join("config.toml"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Load the config file if one resolves, otherwise built-in defaults.
///
/// Missing files degrade to defaults with a warning; parse errors propagate.
pub fn load_or_default(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        debug!("No config file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!("Config file {} not found, using built-in defaults", path.display());
        return Ok(TomlConfig::default());
    }

    debug!("Loading config from {}", path.display());
    load_toml_config(&path)
}

/// Resolve a single string value: CLI → environment → TOML
///
/// Blank values at any tier are skipped.
pub fn resolve_value(cli: Option<&str>, env_var: &str, toml_value: Option<&str>) -> Option<String> {
    let non_blank = |s: &str| !s.trim().is_empty();

    if let Some(v) = cli.filter(|s| non_blank(s)) {
        return Some(v.to_string());
    }
    if let Ok(v) = std::env::var(env_var) {
        if non_blank(&v) {
            return Some(v);
        }
    }
    toml_value.filter(|s| non_blank(s)).map(str::to_string)
}

/// Write config to `path` atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
