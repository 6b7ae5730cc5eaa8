//! Quota gating and oldest-first eviction.
//!
//! A [`QuotaTracker`] owns a [`NamespacedStore`] and a byte ceiling. Usage is
//! measured across the whole backend, because the backend's space is shared
//! with every other writer. Values written through the tracker are sealed in
//! an envelope carrying [`ENVELOPE_TAG`] and the time they were stored, which
//! is what [`QuotaTracker::cleanup`] orders evictions by.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shelf_backend::{entry_size, KeyValueStore};
use shelf_codec::{Codec, JsonCodec};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::namespaced::NamespacedStore;

/// Marker carried by every envelope the tracker writes. Bump the version if
/// the sealed layout changes.
pub const ENVELOPE_TAG: &str = "shelf-envelope/1";

/// Aggregate `len(key) + len(value)` over every entry in `backend`.
///
/// Keys that disappear between enumeration and read are skipped.
pub fn measure_usage(backend: &dyn KeyValueStore) -> StoreResult<u64> {
    measure_prefixed(backend, "")
}

pub(crate) fn measure_prefixed(backend: &dyn KeyValueStore, prefix: &str) -> StoreResult<u64> {
    let mut total = 0;
    for key in backend.keys()? {
        if !key.starts_with(prefix) {
            continue;
        }
        if let Some(value) = backend.get(&key)? {
            total += entry_size(&key, &value);
        }
    }
    Ok(total)
}

/// A value as written by [`QuotaTracker::store_data`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope<T> {
    /// Milliseconds since the UNIX epoch at write time.
    pub stored_at: u64,
    pub value: T,
}

// Stored form of an envelope. The value is encoded on its own first, so the
// tag and stamp can be read back without knowing the value type under any
// codec. Field order is shared with `Sealed` for binary codecs.
#[derive(Serialize)]
struct SealedRef<'a> {
    tag: &'a str,
    stored_at: u64,
    value: &'a str,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Sealed {
    tag: String,
    stored_at: u64,
    value: String,
}

/// Outcome of a [`QuotaTracker::cleanup`] pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Evicted keys, oldest first, without the namespace prefix.
    pub evicted: Vec<String>,
    /// Bytes released by the evictions.
    pub freed_bytes: u64,
    /// Backend usage after the pass.
    pub current_size: u64,
}

/// Gates writes against a maximum aggregate size of the backend.
///
/// The tracker is ready as soon as it is constructed and stays usable
/// indefinitely. Every quota decision rescans the backend, so writes made
/// behind the tracker's back are always accounted for. `current_size` is the
/// usage seen by the last scan that constructed, wrote, refreshed or cleaned.
///
/// Cleanup only evicts entries in the tracker's namespace that carry its
/// envelope, so the namespace should be dedicated to the tracker.
pub struct QuotaTracker<C: Codec = JsonCodec> {
    store: NamespacedStore<C>,
    max_size: u64,
    current_size: u64,
    clock: Arc<dyn Clock>,
}

impl<C: Codec> QuotaTracker<C> {
    /// Create a tracker using the system clock and scan current usage.
    pub fn new(store: NamespacedStore<C>, max_size: u64) -> StoreResult<Self> {
        Self::with_clock(store, max_size, Arc::new(SystemClock))
    }

    /// Create a tracker with an explicit time source.
    pub fn with_clock(
        store: NamespacedStore<C>,
        max_size: u64,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let current_size = measure_usage(store.backend().as_ref())?;
        debug!(prefix = store.prefix(), max_size, current_size, "quota tracker ready");
        Ok(Self {
            store,
            max_size,
            current_size,
            clock,
        })
    }

    /// The namespace the tracker writes to.
    pub fn store(&self) -> &NamespacedStore<C> {
        &self.store
    }

    /// The quota ceiling in bytes.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Usage measured by the most recent scan.
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    /// Bytes left under the quota as of the most recent scan.
    pub fn remaining(&self) -> u64 {
        self.max_size.saturating_sub(self.current_size)
    }

    /// Rescan the backend and return the fresh usage.
    pub fn refresh(&mut self) -> StoreResult<u64> {
        self.current_size = measure_usage(self.store.backend().as_ref())?;
        Ok(self.current_size)
    }

    fn seal(&self, stored_at: u64, payload: &str) -> StoreResult<String> {
        self.store
            .codec()
            .encode(&SealedRef {
                tag: ENVELOPE_TAG,
                stored_at,
                value: payload,
            })
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode `text` as one of our envelopes, or say why it is not one.
    fn unseal(&self, text: &str) -> Result<Sealed, String> {
        let sealed: Sealed = self.store.codec().decode(text).map_err(|e| e.to_string())?;
        if sealed.tag != ENVELOPE_TAG {
            return Err(format!("unrecognised envelope tag {:?}", sealed.tag));
        }
        Ok(sealed)
    }

    /// Encode `data` and size it against a fresh scan of the backend.
    ///
    /// Returns the encoded payload, an upper bound on its sealed length
    /// (measured with the widest possible stamp), and current usage.
    fn size_up<T: Serialize + ?Sized>(&self, data: &T) -> StoreResult<(String, u64, u64)> {
        let payload = self
            .store
            .codec()
            .encode(data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let required = self.seal(u64::MAX, &payload)?.len() as u64;
        let used = measure_usage(self.store.backend().as_ref())?;
        Ok((payload, required, used))
    }

    /// Returns `true` if `data` fits under the quota given the backend's
    /// usage right now. Values the codec cannot encode never fit, and neither
    /// does anything while the backend cannot be scanned.
    pub fn can_store<T: Serialize + ?Sized>(&self, data: &T) -> bool {
        match self.size_up(data) {
            Ok((_, required, used)) => used.saturating_add(required) <= self.max_size,
            Err(e) => {
                debug!(prefix = self.store.prefix(), error = %e, "cannot size value");
                false
            }
        }
    }

    /// Write `data` under `key` if it fits, then rescan usage.
    ///
    /// The gate uses a fresh scan, not `current_size`. A refusal returns
    /// [`StoreError::QuotaExceeded`] without writing and without changing
    /// `current_size`.
    pub fn store_data<T: Serialize + ?Sized>(&mut self, key: &str, data: &T) -> StoreResult<()> {
        let (payload, required, used) = self.size_up(data)?;
        if used.saturating_add(required) > self.max_size {
            return Err(StoreError::QuotaExceeded {
                key: format!("{}{}", self.store.prefix(), key),
                required,
                available: self.max_size.saturating_sub(used),
            });
        }

        let text = self.seal(self.clock.now_ms(), &payload)?;
        self.store.write_text(key, &text)?;
        self.refresh()?;
        Ok(())
    }

    /// Read back a value written by [`Self::store_data`], with its stamp.
    ///
    /// Entries that are not tracker envelopes fail with
    /// [`StoreError::Deserialization`].
    pub fn load_data<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<Envelope<T>>> {
        let Some(text) = self.store.read_text(key)? else {
            return Ok(None);
        };
        let unreadable = |reason: String| StoreError::Deserialization {
            key: format!("{}{}", self.store.prefix(), key),
            reason,
        };
        let sealed = self.unseal(&text).map_err(unreadable)?;
        let value = self
            .store
            .codec()
            .decode(&sealed.value)
            .map_err(|e| unreadable(e.to_string()))?;
        Ok(Some(Envelope {
            stored_at: sealed.stored_at,
            value,
        }))
    }

    /// Evict the oldest tracker-written entries until usage is back under
    /// the quota.
    ///
    /// Entries are taken in ascending `stored_at` order, ties broken by key.
    /// Entries that do not carry the tracker's envelope are never evicted; if
    /// only those remain the pass stops with usage still over the quota.
    pub fn cleanup(&mut self) -> StoreResult<CleanupReport> {
        self.refresh()?;
        if self.current_size <= self.max_size {
            return Ok(CleanupReport {
                current_size: self.current_size,
                ..CleanupReport::default()
            });
        }

        let prefix_len = self.store.prefix().len();
        let mut candidates = Vec::new();
        for raw in self.store.get_all_raw_keys()? {
            let key = &raw[prefix_len..];
            let Some(text) = self.store.read_text(key)? else {
                continue;
            };
            match self.unseal(&text) {
                Ok(sealed) => candidates.push((sealed.stored_at, key.to_string(), entry_size(&raw, &text))),
                Err(reason) => debug!(key = %raw, reason = %reason, "skipping entry without envelope"),
            }
        }
        candidates.sort();

        let mut report = CleanupReport::default();
        for (stored_at, key, size) in candidates {
            if self.current_size <= self.max_size {
                break;
            }
            if self.store.remove_item(&key)? {
                self.current_size = self.current_size.saturating_sub(size);
                report.freed_bytes += size;
                debug!(key = %key, stored_at, size, "evicted");
                report.evicted.push(key);
            }
        }

        report.current_size = self.refresh()?;
        if report.current_size > self.max_size {
            warn!(
                current_size = report.current_size,
                max_size = self.max_size,
                "cleanup finished above quota"
            );
        }
        Ok(report)
    }
}

impl<C: Codec> std::fmt::Debug for QuotaTracker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaTracker")
            .field("store", &self.store)
            .field("max_size", &self.max_size)
            .field("current_size", &self.current_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use serde_json::json;
    use shelf_backend::InMemoryBackend;
    use shelf_codec::HexBincodeCodec;

    use crate::clock::ManualClock;

    fn backend() -> Arc<dyn KeyValueStore> {
        Arc::new(InMemoryBackend::unbounded())
    }

    fn new_tracker(
        backend: Arc<dyn KeyValueStore>,
        max_size: u64,
    ) -> (Arc<ManualClock>, QuotaTracker) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = NamespacedStore::new(backend, "q_");
        let tracker = QuotaTracker::with_clock(store, max_size, clock.clone()).unwrap();
        (clock, tracker)
    }

    // -----------------------------------------------------------------------
    // Construction and measurement
    // -----------------------------------------------------------------------

    #[test]
    fn construction_scans_existing_usage() {
        let backend = backend();
        backend.set("foreign", "12345").unwrap(); // 12
        let (_, tracker) = new_tracker(backend, 100);
        assert_eq!(tracker.current_size(), 12);
        assert_eq!(tracker.remaining(), 88);
    }

    #[test]
    fn measure_usage_counts_keys_and_values() {
        let backend = backend();
        backend.set("a", "1").unwrap();
        backend.set("bb", "22").unwrap();
        assert_eq!(measure_usage(backend.as_ref()).unwrap(), 6);
        assert_eq!(measure_prefixed(backend.as_ref(), "b").unwrap(), 4);
    }

    // -----------------------------------------------------------------------
    // can_store / store_data
    // -----------------------------------------------------------------------

    #[test]
    fn stores_envelope_with_stamp() {
        let backend = backend();
        let (_, mut tracker) = new_tracker(backend.clone(), 1_000);
        tracker.store_data("cart", &json!({"items": 2})).unwrap();

        assert_eq!(
            backend.get("q_cart").unwrap().as_deref(),
            Some(r#"{"tag":"shelf-envelope/1","stored_at":1000,"value":"{\"items\":2}"}"#)
        );
        let env = tracker.load_data::<serde_json::Value>("cart").unwrap().unwrap();
        assert_eq!(env.stored_at, 1_000);
        assert_eq!(env.value, json!({"items": 2}));
    }

    #[test]
    fn store_recomputes_size() {
        let backend = backend();
        let (_, mut tracker) = new_tracker(backend.clone(), 1_000);
        tracker.store_data("k", &1).unwrap();
        assert_eq!(tracker.current_size(), measure_usage(backend.as_ref()).unwrap());
        assert!(tracker.current_size() > 0);
    }

    #[test]
    fn can_store_true_means_store_succeeds() {
        let data = json!({"note": "x".repeat(40)});
        for max in [60, 70, 80, 90, 100, 120] {
            let (_, mut tracker) = new_tracker(backend(), max);
            if tracker.can_store(&data) {
                tracker.store_data("n", &data).unwrap();
                assert!(tracker.current_size() <= max + "q_n".len() as u64);
            } else {
                assert!(tracker.store_data("n", &data).is_err());
            }
        }
    }

    #[test]
    fn refusal_writes_nothing() {
        let backend = backend();
        backend.set("foreign", "x".repeat(90).as_str()).unwrap();
        let (_, mut tracker) = new_tracker(backend.clone(), 100);
        let before = tracker.current_size();

        assert!(!tracker.can_store(&"y".repeat(50)));
        let err = tracker.store_data("big", &"y".repeat(50)).unwrap_err();
        match err {
            StoreError::QuotaExceeded { key, available, .. } => {
                assert_eq!(key, "q_big");
                assert_eq!(available, 100 - before);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tracker.current_size(), before);
        assert!(backend.get("q_big").unwrap().is_none());
    }

    #[test]
    fn unencodable_data_never_fits() {
        let (_, mut tracker) = new_tracker(backend(), u64::MAX);
        let mut grid = HashMap::new();
        grid.insert((1, 1), 1);
        assert!(!tracker.can_store(&grid));
        assert!(matches!(
            tracker.store_data("grid", &grid),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn external_write_blocks_the_next_store() {
        let backend = backend();
        let (_, mut tracker) = new_tracker(backend.clone(), 100);
        let data = "y".repeat(20);
        assert!(tracker.can_store(&data));

        backend.set("other_blob", &"z".repeat(80)).unwrap(); // 90
        assert_eq!(tracker.current_size(), 0);
        assert!(!tracker.can_store(&data));
        match tracker.store_data("k", &data).unwrap_err() {
            StoreError::QuotaExceeded { available, .. } => assert_eq!(available, 10),
            other => panic!("unexpected error: {other}"),
        }
        assert!(backend.get("q_k").unwrap().is_none());
        assert_eq!(tracker.refresh().unwrap(), 90);
    }

    #[test]
    fn backend_capacity_still_applies() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(InMemoryBackend::with_capacity(10));
        let store = NamespacedStore::new(backend, "q_");
        let mut tracker = QuotaTracker::new(store, 1_000).unwrap();
        let err = tracker.store_data("k", &"too long for the backend").unwrap_err();
        assert!(err.is_quota_exceeded());
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    #[test]
    fn cleanup_under_quota_is_noop() {
        let (_, mut tracker) = new_tracker(backend(), 1_000);
        tracker.store_data("a", &1).unwrap();
        let report = tracker.cleanup().unwrap();
        assert!(report.evicted.is_empty());
        assert_eq!(report.freed_bytes, 0);
        assert_eq!(report.current_size, tracker.current_size());
    }

    #[test]
    fn cleanup_evicts_oldest_first() {
        let backend = backend();
        let (clock, mut tracker) = new_tracker(backend.clone(), 1_000);
        for key in ["k1", "k2", "k3", "k4"] {
            tracker.store_data(key, &"x".repeat(20)).unwrap();
            clock.advance(10);
        }
        let per_entry = tracker.current_size() / 4;

        // Shrinking the quota leaves room for two entries only.
        let mut tighter =
            QuotaTracker::with_clock(NamespacedStore::new(backend, "q_"), per_entry * 2 + 1, clock)
                .unwrap();
        let report = tighter.cleanup().unwrap();

        assert_eq!(report.evicted, vec!["k1".to_string(), "k2".to_string()]);
        assert_eq!(report.freed_bytes, per_entry * 2);
        assert!(report.current_size <= tighter.max_size());
        let mut left = tighter.store().get_all_keys().unwrap();
        left.sort();
        assert_eq!(left, vec!["k3".to_string(), "k4".to_string()]);
    }

    #[test]
    fn cleanup_breaks_ties_by_key() {
        let backend = backend();
        let (_, mut tracker) = new_tracker(backend.clone(), 1_000);
        tracker.store_data("b", &"same").unwrap();
        tracker.store_data("a", &"same").unwrap();
        let per_entry = tracker.current_size() / 2;

        let mut tighter = QuotaTracker::with_clock(
            NamespacedStore::new(backend, "q_"),
            per_entry,
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();
        let report = tighter.cleanup().unwrap();
        assert_eq!(report.evicted, vec!["a".to_string()]);
    }

    #[test]
    fn cleanup_never_evicts_foreign_or_plain_entries() {
        let backend = backend();
        backend.set("foreign", &"f".repeat(50)).unwrap();
        let plain = NamespacedStore::new(backend.clone(), "q_");
        plain.set_item("plain", &"p".repeat(50)).unwrap();

        let (_, mut tracker) = new_tracker(backend.clone(), 10);
        tracker.store_data("stamped", &1).unwrap_err();
        let report = tracker.cleanup().unwrap();

        assert!(report.evicted.is_empty());
        assert!(report.current_size > tracker.max_size());
        assert!(backend.get("foreign").unwrap().is_some());
        assert!(backend.get("q_plain").unwrap().is_some());
    }

    #[test]
    fn cleanup_skips_json_that_only_looks_stamped() {
        let backend = backend();
        let plain = NamespacedStore::new(backend.clone(), "q_");
        plain.set_item("order", &json!({"stored_at": 1, "sku": "A-1"})).unwrap();
        plain
            .set_item("retagged", &json!({"tag": "other/1", "stored_at": 2, "value": "1"}))
            .unwrap();

        let (_, mut tracker) = new_tracker(backend.clone(), 10);
        let report = tracker.cleanup().unwrap();

        assert!(report.evicted.is_empty());
        assert!(backend.get("q_order").unwrap().is_some());
        assert!(backend.get("q_retagged").unwrap().is_some());
        assert!(matches!(
            tracker.load_data::<serde_json::Value>("order"),
            Err(StoreError::Deserialization { .. })
        ));
    }

    #[test]
    fn cleanup_skips_binary_entries_without_envelope() {
        let backend = backend();
        let plain = NamespacedStore::with_codec(backend.clone(), "bin_", HexBincodeCodec);
        plain.set_item("plain", &vec![7u64; 4]).unwrap();

        let store = NamespacedStore::with_codec(backend.clone(), "bin_", HexBincodeCodec);
        let mut tracker = QuotaTracker::with_clock(store, 10, Arc::new(ManualClock::new(0))).unwrap();
        let report = tracker.cleanup().unwrap();

        assert!(report.evicted.is_empty());
        assert!(backend.get("bin_plain").unwrap().is_some());
        assert!(tracker.load_data::<Vec<u64>>("plain").is_err());
    }

    #[test]
    fn cleanup_works_with_binary_codec() {
        let backend = backend();
        let clock = Arc::new(ManualClock::new(500));
        let store = NamespacedStore::with_codec(backend.clone(), "bin_", HexBincodeCodec);
        let mut tracker = QuotaTracker::with_clock(store, 10_000, clock.clone()).unwrap();
        tracker.store_data("old", &vec![1u32; 8]).unwrap();
        clock.advance(1);
        tracker.store_data("new", &vec![2u32; 8]).unwrap();
        let per_entry = tracker.current_size() / 2;

        let store = NamespacedStore::with_codec(backend, "bin_", HexBincodeCodec);
        let mut tighter = QuotaTracker::with_clock(store, per_entry, clock).unwrap();
        let report = tighter.cleanup().unwrap();
        assert_eq!(report.evicted, vec!["old".to_string()]);

        let env = tighter.load_data::<Vec<u32>>("new").unwrap().unwrap();
        assert_eq!(env.stored_at, 501);
        assert_eq!(env.value, vec![2u32; 8]);
    }
}
