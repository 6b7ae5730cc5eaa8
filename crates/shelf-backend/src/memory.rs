use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{BackendError, BackendResult};
use crate::traits::{entry_size, KeyValueStore};

/// Default capacity for bounded backends: 5 MiB, the usual per-origin
/// allowance of browser local storage.
pub const DEFAULT_CAPACITY: u64 = 5 * 1024 * 1024;

/// In-memory, `BTreeMap`-based key-value backend.
///
/// Intended for tests and embedding. Entries live behind a `RwLock` so the
/// backend can be shared through an `Arc` by several namespaces. Data is lost
/// when the backend is dropped.
pub struct InMemoryBackend {
    entries: RwLock<BTreeMap<String, String>>,
    capacity: Option<u64>,
}

impl InMemoryBackend {
    /// Create an empty backend with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty backend holding at most `capacity` bytes.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            capacity: Some(capacity),
        }
    }

    /// Create an empty backend with no capacity limit.
    pub fn unbounded() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            capacity: None,
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> BackendResult<usize> {
        let entries = self.entries.read().map_err(|_| BackendError::LockPoisoned)?;
        Ok(entries.len())
    }

    /// Returns `true` if the backend holds no entries.
    pub fn is_empty(&self) -> BackendResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Aggregate size of all entries in bytes.
    pub fn usage_bytes(&self) -> BackendResult<u64> {
        let entries = self.entries.read().map_err(|_| BackendError::LockPoisoned)?;
        Ok(usage_of(&entries))
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum of [`entry_size`] over a map.
pub(crate) fn usage_of(entries: &BTreeMap<String, String>) -> u64 {
    entries.iter().map(|(k, v)| entry_size(k, v)).sum()
}

/// Reject a write of `key -> value` that would exceed `capacity`.
///
/// The size of any value already stored under `key` is credited back, since
/// an overwrite replaces it.
pub(crate) fn check_capacity(
    entries: &BTreeMap<String, String>,
    key: &str,
    value: &str,
    capacity: Option<u64>,
) -> BackendResult<()> {
    let Some(capacity) = capacity else {
        return Ok(());
    };
    let replaced = entries.get(key).map(|old| entry_size(key, old)).unwrap_or(0);
    let base = usage_of(entries) - replaced;
    let required = entry_size(key, value);
    let available = capacity.saturating_sub(base);
    if required > available {
        return Err(BackendError::CapacityExceeded {
            key: key.to_string(),
            required,
            available,
        });
    }
    Ok(())
}

impl KeyValueStore for InMemoryBackend {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| BackendError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        let mut entries = self.entries.write().map_err(|_| BackendError::LockPoisoned)?;
        check_capacity(&entries, key, value, self.capacity)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> BackendResult<bool> {
        let mut entries = self.entries.write().map_err(|_| BackendError::LockPoisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn keys(&self) -> BackendResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| BackendError::LockPoisoned)?;
        Ok(entries.keys().cloned().collect())
    }

    fn clear_all(&self) -> BackendResult<()> {
        let mut entries = self.entries.write().map_err(|_| BackendError::LockPoisoned)?;
        entries.clear();
        Ok(())
    }

    fn capacity(&self) -> Option<u64> {
        self.capacity
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("entry_count", &self.len().ok())
            .field("capacity", &self.capacity)
            .finish()
    }
}
