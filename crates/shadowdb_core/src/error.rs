//! Error types for ShadowDB core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ShadowDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] shadowdb_storage::StorageError),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend version is below what any driver supports.
    #[error("backend version {detected} is not supported, minimum version: {minimum}")]
    UnsupportedBackend {
        /// Version string reported by the backend.
        detected: String,
        /// Minimum version required.
        minimum: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The source of truth failed to answer.
    #[error("source error: {message}")]
    Source {
        /// Description of the failure.
        message: String,
    },

    /// The async job queue rejected a job.
    #[error("queue error: {message}")]
    Queue {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an unsupported backend error.
    pub fn unsupported_backend(detected: impl Into<String>, minimum: impl Into<String>) -> Self {
        Self::UnsupportedBackend {
            detected: detected.into(),
            minimum: minimum.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a source error.
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Creates a queue error.
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }
}
