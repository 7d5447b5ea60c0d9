//! Core error types for focusgate-core.
//!
//! Nothing in the background service is fatal: most of these errors are
//! logged and degraded to a safe default by the caller. They surface to the
//! user only through the CLI, where invalid input exits non-zero.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focusgate-core.
///
/// Returned by operations that both validate user input and touch the
/// store, such as editing the blocker settings.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Durable store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Store is locked")]
    Locked,

    /// A stored value could not be encoded or decoded
    #[error("Stored value for '{key}' is malformed: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The in-process lock guarding the store was poisoned
    #[error("Store lock poisoned")]
    Poisoned,

    /// A running daemon owns the timer state in this data directory
    #[error("A focusgate daemon (pid {pid}) owns this data directory; send timer commands to it instead")]
    Leased { pid: u32 },
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

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors for user-supplied settings.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Time range is malformed or reversed
    #[error("Invalid time range '{input}': expected HHMM-HHMM with start <= end")]
    InvalidTimeRange { input: String },

    /// Time is not a zero-padded 24h HHMM string
    #[error("Invalid time '{0}': expected four digits HHMM")]
    InvalidTime(String),

    /// Weekday index outside 0..=6
    #[error("Invalid weekday {0}: expected 0 (Sunday) through 6 (Saturday)")]
    InvalidWeekday(u8),

    /// Domain pattern normalized to nothing
    #[error("Domain pattern is empty")]
    EmptyDomain,

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_wraps_into_core_error() {
        let err: CoreError = ValidationError::InvalidWeekday(9).into();
        assert!(err.to_string().contains("Invalid weekday 9"));
    }

    #[test]
    fn busy_sqlite_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(StoreError::from(err), StoreError::Locked));
    }
}
