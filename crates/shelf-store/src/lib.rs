//! Namespaced, quota-aware typed storage for Shelf.
//!
//! This crate layers typed access over a flat [`KeyValueStore`] backend:
//!
//! - [`NamespacedStore`] -- encode/decode values through a [`Codec`] and keep
//!   every key under a text prefix, so several logical stores can share one
//!   backend without seeing each other's entries
//! - [`QuotaTracker`] -- measure aggregate usage of the backend and refuse
//!   writes that would exceed a configured maximum; entries it writes carry a
//!   `stored_at` stamp so [`QuotaTracker::cleanup`] can evict oldest-first
//! - [`Preferences`] -- a single typed settings document with defaults
//! - [`StoreConfig`] -- TOML configuration for the pieces above
//!
//! # Design Rules
//!
//! 1. The backend is always injected (`Arc<dyn KeyValueStore>`), never looked
//!    up globally.
//! 2. Namespace operations never observe or touch keys outside their prefix.
//! 3. Quota state is recomputed from the backend, never trusted as a cache.
//! 4. Storage failures come back as [`StoreError`] values or as the caller's
//!    default; nothing panics.

pub mod clock;
pub mod config;
pub mod error;
pub mod namespaced;
pub mod prefs;
pub mod quota;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendConfig, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use namespaced::NamespacedStore;
pub use prefs::{Preferences, DEFAULT_PREFERENCES_KEY};
pub use quota::{measure_usage, CleanupReport, Envelope, QuotaTracker, ENVELOPE_TAG};

pub use shelf_backend::{BackendError, FileBackend, InMemoryBackend, KeyValueStore};
pub use shelf_codec::{Codec, CodecError, HexBincodeCodec, JsonCodec};
