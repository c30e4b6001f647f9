//! Error taxonomy for the shared-memory metrics store

use thiserror::Error;

/// Which kind of advisory lock an operation was attempting to acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Non-exclusive lock held by index scans
    Shared,
    /// Exclusive lock held by header/entry-table mutations
    Exclusive,
}

impl std::fmt::Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKind::Shared => write!(f, "shared"),
            LockKind::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Errors that can occur while operating the metrics store
#[derive(Error, Debug)]
pub enum StoreError {
    /// A metric config failed validation and was dropped
    #[error("invalid metric config: {reason}")]
    ConfigInvalid {
        /// Human-readable validation failure
        reason: String,
    },

    /// The host shared-memory primitive is missing, or open/create failed
    #[error("shared memory segment unavailable: {reason}")]
    SegmentUnavailable {
        /// Human-readable failure reason
        reason: String,
    },

    /// The index segment has no room for another 16-byte entry
    #[error("index segment is full")]
    IndexFull,

    /// The data segment has no room for another metric's bytes
    #[error("data segment is full")]
    DataFull,

    /// A lock was not acquired within its timeout
    #[error("timed out waiting for {kind} lock on rendezvous file")]
    LockTimeout {
        /// The kind of lock that was being requested
        kind: LockKind,
    },

    /// The on-disk header version differs from what the caller configured
    #[error("version conflict: stored={stored} requested={requested}")]
    VersionConflict {
        /// Version found in the header
        stored: u32,
        /// Version the caller configured
        requested: u32,
    },

    /// A value was out of range or the wrong type for its slot and was
    /// rewritten to zero
    #[error("value for '{name}' out of range or wrong type, reset to 0")]
    RangeOrTypeViolation {
        /// Physical metric name
        name: String,
    },

    /// Underlying I/O failure
    #[error("I/O error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },
}

/// Result type for fallible store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while loading a [`crate::config::StoreConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be found or read
    #[error("configuration file not found or unreadable: {0}")]
    FileNotFound(String),

    /// TOML parsing failed
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed (e.g. `version` is 0)
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}
