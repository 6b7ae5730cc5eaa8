use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::memory::check_capacity;
use crate::traits::KeyValueStore;

/// Snapshot format version written by this backend.
const SNAPSHOT_VERSION: u32 = 1;

/// On-disk snapshot layout.
///
/// ```text
/// {
///   "version": 1,
///   "checksum": <CRC32 of the compact JSON encoding of `entries`>,
///   "entries": { "<key>": "<value>", ... }
/// }
/// ```
#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    checksum: u32,
    entries: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    checksum: u32,
    entries: &'a BTreeMap<String, String>,
}

fn entries_checksum(entries: &BTreeMap<String, String>) -> BackendResult<u32> {
    let body =
        serde_json::to_vec(entries).map_err(|e| BackendError::Serialization(e.to_string()))?;
    Ok(crc32fast::hash(&body))
}

/// Key-value backend persisted as a single snapshot file.
///
/// The whole map is held in memory and the snapshot is rewritten after every
/// mutation: the new contents go to a temp file in the same directory, which
/// is then renamed over the old snapshot. If persisting fails the in-memory
/// change is rolled back, so memory and disk never disagree.
pub struct FileBackend {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    capacity: Option<u64>,
}

impl FileBackend {
    /// Open (or create) a snapshot-backed store at `path`.
    ///
    /// A missing file yields an empty store; parent directories are created.
    /// A snapshot that fails its checksum or has an unknown version is
    /// rejected with [`BackendError::Corrupt`].
    pub fn open(path: &Path, capacity: Option<u64>) -> BackendResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entries = if path.exists() {
            let raw = fs::read(path)?;
            let snapshot: Snapshot = serde_json::from_slice(&raw)
                .map_err(|e| BackendError::Corrupt(format!("unreadable snapshot: {e}")))?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(BackendError::Corrupt(format!(
                    "unsupported snapshot version {}",
                    snapshot.version
                )));
            }
            let computed = entries_checksum(&snapshot.entries)?;
            if computed != snapshot.checksum {
                return Err(BackendError::Corrupt(format!(
                    "checksum mismatch: stored {:08x}, computed {computed:08x}",
                    snapshot.checksum
                )));
            }
            snapshot.entries
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), entries = entries.len(), "file backend opened");
        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
            capacity,
        })
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> BackendResult<()> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            checksum: entries_checksum(entries)?,
            entries,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| BackendError::Io(e.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileBackend {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| BackendError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        let mut entries = self.entries.write().map_err(|_| BackendError::LockPoisoned)?;
        check_capacity(&entries, key, value, self.capacity)?;
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> BackendResult<bool> {
        let mut entries = self.entries.write().map_err(|_| BackendError::LockPoisoned)?;
        let Some(old) = entries.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&entries) {
            entries.insert(key.to_string(), old);
            return Err(e);
        }
        Ok(true)
    }

    fn keys(&self) -> BackendResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| BackendError::LockPoisoned)?;
        Ok(entries.keys().cloned().collect())
    }

    fn clear_all(&self) -> BackendResult<()> {
        let mut entries = self.entries.write().map_err(|_| BackendError::LockPoisoned)?;
        let old = std::mem::take(&mut *entries);
        if let Err(e) = self.persist(&entries) {
            *entries = old;
            return Err(e);
        }
        Ok(())
    }

    fn capacity(&self) -> Option<u64> {
        self.capacity
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .finish()
    }
}
