//! Prefix-scoped, codec-typed access to a shared backend.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use shelf_backend::KeyValueStore;
use shelf_codec::{Codec, JsonCodec};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::quota::{measure_prefixed, measure_usage};

/// Typed storage scoped to one key prefix of a shared backend.
///
/// Every key passed in is stored as `prefix + key`. Enumeration and
/// `clear` only ever see keys starting with the prefix, so several stores
/// with distinct prefixes can share one backend. Prefixes that are prefixes
/// of each other (`"app"` and `"app_x"`) do overlap; pick them accordingly.
pub struct NamespacedStore<C: Codec = JsonCodec> {
    backend: Arc<dyn KeyValueStore>,
    prefix: String,
    codec: C,
}

impl NamespacedStore<JsonCodec> {
    /// Create a JSON-encoding store over `backend` under `prefix`.
    pub fn new(backend: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self::with_codec(backend, prefix, JsonCodec)
    }
}

impl<C: Codec> NamespacedStore<C> {
    /// Create a store that encodes values with `codec`.
    pub fn with_codec(backend: Arc<dyn KeyValueStore>, prefix: impl Into<String>, codec: C) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            codec,
        }
    }

    /// The text prepended to every key this store writes.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The codec values are encoded with.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The shared backend this store writes to.
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Encode `value` and store it under `key`.
    ///
    /// Fails with [`StoreError::Serialization`] if the codec cannot represent
    /// the value (nothing is written), or [`StoreError::QuotaExceeded`] if
    /// the backend refuses the write for capacity.
    pub fn set_item<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let text = self
            .codec
            .encode(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.write_text(key, &text)
    }

    /// Read and decode the value under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent and
    /// [`StoreError::Deserialization`] if the stored text does not decode.
    pub fn get_item<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let full = self.full_key(key);
        let Some(text) = self.backend.get(&full)? else {
            return Ok(None);
        };
        self.codec
            .decode(&text)
            .map(Some)
            .map_err(|e| StoreError::Deserialization {
                key: full,
                reason: e.to_string(),
            })
    }

    /// Read `key`, falling back to `default` when it is absent or unreadable.
    ///
    /// An absent key hands `default` straight back without encoding it. Decode
    /// and backend failures are logged and also yield `default`.
    pub fn get_item_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get_item(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                warn!(prefix = %self.prefix, key, error = %e, "falling back to default value");
                default
            }
        }
    }

    /// Returns `true` if something is stored under `key`.
    pub fn has_item(&self, key: &str) -> StoreResult<bool> {
        Ok(self.backend.get(&self.full_key(key))?.is_some())
    }

    /// Delete `key`. Removing an absent key is not an error.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove_item(&self, key: &str) -> StoreResult<bool> {
        let full = self.full_key(key);
        let existed = self.backend.remove(&full)?;
        debug!(key = %full, existed, "item removed");
        Ok(existed)
    }

    /// Delete every entry in this namespace and return how many were removed.
    ///
    /// The backend's key list is snapshotted before anything is deleted.
    pub fn clear(&self) -> StoreResult<usize> {
        let doomed = self.get_all_raw_keys()?;
        let mut removed = 0;
        for key in &doomed {
            if self.backend.remove(key)? {
                removed += 1;
            }
        }
        debug!(prefix = %self.prefix, removed, "namespace cleared");
        Ok(removed)
    }

    /// Keys in this namespace with the prefix stripped, in backend order.
    pub fn get_all_keys(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .backend
            .keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(self.prefix.as_str()).map(str::to_string))
            .collect())
    }

    /// Keys in this namespace as stored, prefix included, in backend order.
    pub fn get_all_raw_keys(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .backend
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(self.prefix.as_str()))
            .collect())
    }

    /// Aggregate `len(key) + len(value)` over the **whole backend**.
    ///
    /// This is not scoped to the namespace: entries of every other namespace
    /// sharing the backend are counted too. Use [`Self::namespace_size`] for
    /// the scoped figure.
    pub fn get_storage_size(&self) -> StoreResult<u64> {
        measure_usage(self.backend.as_ref())
    }

    /// Aggregate `len(key) + len(value)` over this namespace only.
    pub fn namespace_size(&self) -> StoreResult<u64> {
        measure_prefixed(self.backend.as_ref(), &self.prefix)
    }

    pub(crate) fn read_text(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.backend.get(&self.full_key(key))?)
    }

    pub(crate) fn write_text(&self, key: &str, text: &str) -> StoreResult<()> {
        let full = self.full_key(key);
        self.backend.set(&full, text)?;
        debug!(key = %full, bytes = text.len(), codec = self.codec.name(), "item stored");
        Ok(())
    }
}

impl<C: Codec> std::fmt::Debug for NamespacedStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespacedStore")
            .field("prefix", &self.prefix)
            .field("codec", &self.codec.name())
            .finish()
    }
}
