//! Error types for backend operations.

use thiserror::Error;

/// Errors from key-value backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The write would push the aggregate size over the backend capacity.
    #[error("capacity exceeded writing {key}: {required} bytes required, {available} available")]
    CapacityExceeded {
        key: String,
        required: u64,
        available: u64,
    },

    /// I/O error from a persistent backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted snapshot failed its integrity check.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    /// The persisted snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A backend lock was poisoned by a panicking writer.
    #[error("backend lock poisoned")]
    LockPoisoned,
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
