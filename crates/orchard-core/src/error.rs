//! Core error types for orchard-core.
//!
//! Errors are grouped by the layer that raises them. Engine errors are the
//! user-facing rejections (balance, quota, duration, invalid transitions);
//! storage and migration errors are absorbed by the host and reported as
//! warnings or a fallback, never as a crash.

use std::path::PathBuf;
use thiserror::Error;

use crate::focus::SessionStatus;

/// Core error type for orchard-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Rejected engine operation
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Durable storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Persisted payload could not be migrated
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// OS-level blocking capability errors
    #[error("Blocking bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Deep link parsing errors
    #[error("Deep link error: {0}")]
    DeepLink(#[from] DeepLinkError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rejections produced by engine transitions.
///
/// None of these leave a partial effect behind: the engine state is only
/// committed when the whole operation succeeds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Insufficient balance: requested {requested}, available {balance}")]
    InsufficientBalance { requested: u64, balance: u64 },

    #[error("Daily unlock limit reached ({allowed} per day)")]
    DailyLimitReached { allowed: u32 },

    #[error("Invalid unlock duration: {requested} minutes (allowed 1..={max})")]
    InvalidDuration { requested: u32, max: u32 },

    #[error("Reward amount must be greater than zero")]
    InvalidAmount,

    #[error("A focus session is already in progress ({id})")]
    SessionInProgress { id: String },

    #[error("No focus session in progress")]
    NoActiveSession,

    #[error("Cannot {action} a session that is {status}")]
    InvalidTransition {
        status: SessionStatus,
        action: &'static str,
    },

    #[error("Unknown unlock session: {0}")]
    UnknownUnlockSession(String),

    #[error("Unlock session {0} is not active")]
    UnlockNotActive(String),

    #[error("At least one app token is required")]
    EmptyTokenSet,

    #[error("App blocking is disabled")]
    BlockingDisabled,

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
}

/// Durable storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
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

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Write to durable storage failed; the in-memory state still commits
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Persisted payload could not be brought to the current schema.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Payload is not valid JSON: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("Payload version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u64, supported: u64 },

    #[error("Structural corruption at '{path}': {message}")]
    Structural { path: String, message: String },

    #[error("Ledger integrity check failed: {0}")]
    Integrity(String),
}

impl MigrationError {
    pub fn structural(path: impl Into<String>, message: impl Into<String>) -> Self {
        MigrationError::Structural {
            path: path.into(),
            message: message.into(),
        }
    }
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
}

/// Errors reported by the OS-level blocking capability.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Blocking capability rejected {command}: {message}")]
    Rejected {
        command: &'static str,
        message: String,
    },

    #[error("Shared channel error: {0}")]
    Channel(#[from] StorageError),
}

/// Errors parsing the unlock deep link.
#[derive(Error, Debug)]
pub enum DeepLinkError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported deep link target: {0}")]
    UnsupportedTarget(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseBusy
                    || inner.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
