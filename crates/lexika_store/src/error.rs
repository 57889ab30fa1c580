//! Error types for the local store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in local store operations.
///
/// Storage failures are propagated to the immediate caller and never
/// retried inside the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Persistence backend failure (quota, permissions, I/O).
    #[error("storage backend error: {0}")]
    Backend(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted snapshot is structurally invalid.
    #[error("corrupt snapshot: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// A write would violate a unique secondary index.
    #[error("unique index violation on {index}: {value:?}")]
    UniqueViolation {
        /// Name of the violated index.
        index: &'static str,
        /// The duplicated value.
        value: String,
    },

    /// A queued operation id was not found.
    #[error("operation not found: {op_id}")]
    OperationNotFound {
        /// The missing operation id.
        op_id: u64,
    },
}

impl StoreError {
    /// Creates a corrupt snapshot error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Creates a unique index violation error.
    pub fn unique_violation(index: &'static str, value: impl Into<String>) -> Self {
        Self::UniqueViolation {
            index,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::unique_violation("language.code", "de");
        assert!(err.to_string().contains("language.code"));
        assert!(err.to_string().contains("de"));

        let err = StoreError::OperationNotFound { op_id: 12 };
        assert!(err.to_string().contains("12"));
    }
}
