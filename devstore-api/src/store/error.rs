//! Store error types.

use thiserror::Error;

/// Errors that can occur during store operations.
///
/// A cancelled watch is not an error: its subscription simply ends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A required field is missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A device with the same id already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Device not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Revision mismatch (optimistic concurrency control).
    #[error("revision conflict on {id}: stored {expected}, got {actual}")]
    Conflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// A subscriber fell too far behind and was disconnected.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Internal error.
    #[error("internal: {0}")]
    Internal(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
