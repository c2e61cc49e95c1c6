//! Core error types for focusroom-core.
//!
//! Nothing in here is fatal to the engine. Conflicts are absorbed by the
//! coordinator and persistence failures are surfaced to the host as
//! warnings while the in-memory countdown keeps going.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focusroom-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A second session was requested while one is still open
    #[error("Session conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// The record store rejected or failed a call
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

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
}

/// Raised when the at-most-one-open-session rule would be broken.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("a session is already open ({})", .session_id.as_deref().unwrap_or("unpersisted"))]
    SessionAlreadyOpen { session_id: Option<String> },
}

/// Record store errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Referenced record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A stored column could not be mapped back into the domain model
    #[error("Corrupt value for '{field}': {value}")]
    Corrupt { field: String, value: String },

    /// The blocking worker running the query died
    #[error("Storage task failed: {0}")]
    TaskFailed(String),
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

    /// Key is not part of the configuration tree
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid date range
    #[error("Invalid range: end ({end}) is before start ({start})")]
    InvalidRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseBusy
                    || inner.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    PersistenceError::Locked
                } else {
                    PersistenceError::QueryFailed(err.to_string())
                }
            }
            rusqlite::Error::QueryReturnedNoRows => {
                PersistenceError::NotFound("query returned no rows".into())
            }
            _ => PersistenceError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Persistence(err.into())
    }
}

impl From<tokio::task::JoinError> for PersistenceError {
    fn from(err: tokio::task::JoinError) -> Self {
        PersistenceError::TaskFailed(err.to_string())
    }
}

impl CoreError {
    /// True for errors the host should show as a non-blocking warning.
    pub fn is_persistence(&self) -> bool {
        matches!(self, CoreError::Persistence(_))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
