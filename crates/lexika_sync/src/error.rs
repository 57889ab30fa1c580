//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote rejected the request with a non-2xx response.
    #[error("remote rejected request: status {status}: {body}")]
    RemoteRejected {
        /// HTTP status code.
        status: u16,
        /// Response body, kept for diagnostics.
        body: String,
    },

    /// Session credentials were missing or expired.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Response body could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local store failure during sync.
    #[error("store error: {0}")]
    Store(#[from] lexika_store::StoreError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::RemoteRejected { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}
