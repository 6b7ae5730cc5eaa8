use crate::error::BackendResult;

/// Byte size an entry occupies against a backend's capacity.
pub fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

/// Flat, string-keyed, string-valued storage with a finite byte capacity.
///
/// Implementations must satisfy these invariants:
/// - `set` either stores the value or returns an error with the previous
///   state intact. Capacity rejections use `BackendError::CapacityExceeded`.
/// - `remove` of an absent key is not an error.
/// - `keys` returns a snapshot. Callers may mutate the store while walking
///   it, and must not assume any particular order.
pub trait KeyValueStore: Send + Sync {
    /// Read the text stored under `key`.
    ///
    /// Returns `Ok(None)` if the key was never set or has been removed.
    fn get(&self, key: &str) -> BackendResult<Option<String>>;

    /// Store `value` under `key`, overwriting any previous value.
    fn set(&self, key: &str, value: &str) -> BackendResult<()>;

    /// Delete `key`. Returns `true` if it existed.
    fn remove(&self, key: &str) -> BackendResult<bool>;

    /// Snapshot of all keys currently stored.
    fn keys(&self) -> BackendResult<Vec<String>>;

    /// Delete every key in the backend.
    fn clear_all(&self) -> BackendResult<()>;

    /// Configured capacity in bytes, or `None` when unbounded.
    fn capacity(&self) -> Option<u64>;
}
