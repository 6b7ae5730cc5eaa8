//! Flat key-value backends for Shelf.
//!
//! This crate defines the primitive every higher Shelf layer is written
//! against: a string-keyed, string-valued mapping with a finite capacity in
//! bytes. It mirrors the facility a browser hands out as `localStorage`, but
//! as an injected collaborator instead of an ambient global.
//!
//! # Backends
//!
//! All backends implement the [`KeyValueStore`] trait:
//!
//! - [`InMemoryBackend`] -- `BTreeMap`-based store for tests and embedding
//! - [`FileBackend`] -- snapshot file on disk, rewritten atomically on every
//!   mutation and checked with CRC32 on open
//!
//! # Capacity
//!
//! The size of an entry is `key.len() + value.len()` in UTF-8 bytes. A write
//! that would push the aggregate over the configured capacity is rejected with
//! [`BackendError::CapacityExceeded`] and leaves the store unchanged.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{BackendError, BackendResult};
pub use file::FileBackend;
pub use memory::{InMemoryBackend, DEFAULT_CAPACITY};
pub use traits::{entry_size, KeyValueStore};
