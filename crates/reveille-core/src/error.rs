//! Core error types for reveille-core.
//!
//! This module defines the error hierarchy using thiserror. Recoverable
//! conditions (wrong challenge answers, storage quota warnings) are modelled
//! as outcomes or events by their callers; these types cover the rest.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for reveille-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Alarm session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Audio output errors
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The backing store has no room left for the write
    #[error("Storage full: {0}")]
    Full(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored value could not be encoded or decoded
    #[error("Corrupt value for key '{key}': {message}")]
    Corrupt { key: String, message: String },

    /// The data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(#[from] std::io::Error),
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

    /// Key does not exist in the configuration tree
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Validation errors raised by the alarm editor path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Time is not a well-formed 24h "HH:MM"
    #[error("Invalid alarm time '{0}': expected HH:MM (24h)")]
    InvalidTime(String),

    /// Difficulty is not one of the known tiers
    #[error("Invalid difficulty '{0}': expected easy, medium or hard")]
    InvalidDifficulty(String),

    /// Weekday index outside 0-6
    #[error("Invalid weekday index {0}: expected 0 (Sunday) through 6 (Saturday)")]
    InvalidWeekday(u8),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// No alarm with that id
    #[error("Alarm not found: {0}")]
    UnknownAlarm(String),
}

/// Errors from trigger/dismiss transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Dismiss or snooze requested while nothing is ringing
    #[error("No alarm is currently ringing")]
    NoActiveSession,
}

/// Audio output errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Output context refused to resume without a user gesture
    #[error("Audio output is suspended until the user interacts")]
    AutoplayBlocked,

    /// Output device failure
    #[error("Audio output failed: {0}")]
    Output(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => match e.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    StorageError::Locked
                }
                rusqlite::ErrorCode::DiskFull => StorageError::Full(err.to_string()),
                _ => StorageError::QueryFailed(err.to_string()),
            },
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
