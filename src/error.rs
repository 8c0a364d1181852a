//! Error types for kyrowatch.
//!
//! Only setup-time misconfiguration is an error. Irregularities met while the
//! engine runs (cycles, vetoes, teardown of a subscription that was never
//! created, stale deferred operations) are expected under dynamic mutation
//! and are absorbed silently.

use thiserror::Error;

/// Errors raised while validating watch options or targets.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Depth {depth} is invalid: use -1 for unbounded or a non-negative level count")]
    InvalidDepth {
        depth: i64,
    },

    #[error("Unrecognized option map: {message}")]
    UnknownOption {
        message: String,
    },

    #[error("Conflicting options: {reason}")]
    ConflictingOptions {
        reason: String,
    },

    #[error("Invalid watch target: {reason}")]
    InvalidTarget {
        reason: String,
    },
}

/// Top-level error type for kyrowatch.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl WatchError {
    /// Create an internal error with a message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this is a configuration error.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is an internal error.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::UnknownOption {
            message: err.to_string(),
        }
    }
}

/// Result type alias for kyrowatch operations.
pub type WatchResult<T> = Result<T, WatchError>;
