//! Error types for the outbox queue

use thiserror::Error;

/// Main error type for outbox operations
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Queue item was not found in the store
    #[error("Queue item not found: {0}")]
    ItemNotFound(String),

    /// Invalid operation for the item's current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    Storage(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using OutboxError
pub type OutboxResult<T> = Result<T, OutboxError>;

/// Classified outcome of a failed remote submission.
///
/// This is domain data, not a fault: the processing loop inspects the
/// classification to decide between backoff retry and terminal failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Transient failure (network down, remote unavailable, 5xx).
    /// Eligible for backoff retry up to the configured attempt ceiling.
    #[error("retryable: {0}")]
    Retryable(String),

    /// Request rejected as invalid or conflicting. Terminal, never retried.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl SubmitError {
    /// Whether this failure is eligible for another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Retryable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OutboxError::ItemNotFound("item_123".to_string());
        assert_eq!(format!("{}", err), "Queue item not found: item_123");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: OutboxError = io_err.into();
        assert!(matches!(err, OutboxError::Io(_)));
    }

    #[test]
    fn test_submit_error_classification() {
        assert!(SubmitError::Retryable("timeout".into()).is_retryable());
        assert!(!SubmitError::Permanent("409 conflict".into()).is_retryable());
    }
}
