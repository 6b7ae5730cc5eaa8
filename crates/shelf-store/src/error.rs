//! Error types for namespaced and quota-tracked storage.

use shelf_backend::BackendError;
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The value could not be encoded; nothing was written.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The stored text for `key` is not a valid encoding of the requested type.
    #[error("deserialization error for {key}: {reason}")]
    Deserialization { key: String, reason: String },

    /// The write was refused for lack of space, either by the quota tracker
    /// or by the backend's own capacity.
    #[error("quota exceeded writing {key}: {required} bytes required, {available} available")]
    QuotaExceeded {
        key: String,
        required: u64,
        available: u64,
    },

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(BackendError),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Returns `true` for capacity and quota refusals.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::CapacityExceeded {
                key,
                required,
                available,
            } => Self::QuotaExceeded {
                key,
                required,
                available,
            },
            other => Self::Backend(other),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
