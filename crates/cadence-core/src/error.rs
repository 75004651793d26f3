//! Core error types for cadence-core.
//!
//! Engine operations (materialization, placement, deduplication, resolution,
//! metrics) never fail: malformed input degrades to an unchanged result.
//! These errors cover the edges where a caller hands us text or files:
//! clock/date parsing, configuration and snapshot persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for cadence-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse errors
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML write errors
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Home/config directory could not be resolved
    #[error("Could not determine configuration directory")]
    NoConfigDir,
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Clock value is not `HH:MM` within a single day
    #[error("Invalid clock time '{0}': expected HH:MM between 00:00 and 23:59")]
    InvalidTime(String),

    /// Calendar date is not `YYYY-MM-DD`
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Weekday number outside ISO 1..=7
    #[error("Invalid weekday {0}: expected 1 (Monday) through 7 (Sunday)")]
    InvalidWeekday(u8),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_converts_into_core_error() {
        let err: CoreError = ValidationError::InvalidTime("25:00".into()).into();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.to_string().contains("25:00"));
    }

    #[test]
    fn config_error_message_names_key() {
        let err = ConfigError::UnknownKey("placement.nope".into());
        assert_eq!(err.to_string(), "Unknown configuration key: placement.nope");
    }
}
