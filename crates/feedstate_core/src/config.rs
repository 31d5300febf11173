//! Runtime configuration for logging and propagation policy.
//!
//! # Responsibility
//! - Describe the knobs a host passes in explicitly (no global settings).
//! - Load them from JSON with defaults for every missing field.
//!
//! # Invariants
//! - A config returned by `from_json_str`/`load` has passed `validate()`.

use crate::logging::normalize_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

const DEFAULT_MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_LOG_FILES: usize = 5;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedStateConfig {
    pub logging: LogConfig,
    pub propagation: PropagationConfig,
}

/// File logging settings consumed by `init_logging`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rotated log files.
    pub log_dir: String,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: String::new(),
            max_file_size_bytes: DEFAULT_MAX_LOG_FILE_SIZE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

/// Duplicate propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Read changes reach every duplicate whose feed is still subscribed.
    pub propagate_read_to_duplicates: bool,
    /// Flag changes stay per copy unless enabled.
    pub propagate_flag_to_duplicates: bool,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            propagate_read_to_duplicates: true,
            propagate_flag_to_duplicates: false,
        }
    }
}

/// Configuration load and validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    InvalidLevel(String),
    InvalidRotation(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "cannot read config: {err}"),
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::InvalidLevel(message) => write!(f, "{message}"),
            Self::InvalidRotation(field) => write!(f, "`{field}` must be greater than zero"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::InvalidLevel(_) | Self::InvalidRotation(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl FeedStateConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Checks value ranges. `log_dir` is checked by `init_logging`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        normalize_level(&self.logging.level)
            .map_err(|err| ConfigError::InvalidLevel(err.to_string()))?;
        if self.logging.max_file_size_bytes == 0 {
            return Err(ConfigError::InvalidRotation("max_file_size_bytes"));
        }
        if self.logging.max_files == 0 {
            return Err(ConfigError::InvalidRotation("max_files"));
        }
        Ok(())
    }
}
