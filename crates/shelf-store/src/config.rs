use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shelf_backend::{FileBackend, InMemoryBackend, KeyValueStore, DEFAULT_CAPACITY};

use crate::error::{StoreError, StoreResult};

/// Top-level configuration for a Shelf store.
///
/// Every field has a default, so a config file only needs to name what it
/// changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix applied to every key.
    pub namespace: String,
    /// Quota tracker ceiling in bytes.
    pub max_size: u64,
    pub backend: BackendConfig,
}

/// Which backend to open and how large it may grow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Memory {
        #[serde(default)]
        capacity: Option<u64>,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        capacity: Option<u64>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: "app_".into(),
            max_size: DEFAULT_CAPACITY,
            backend: BackendConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from(".shelf/store.json"),
            capacity: Some(DEFAULT_CAPACITY),
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Open the configured backend.
    pub fn open_backend(&self) -> StoreResult<Arc<dyn KeyValueStore>> {
        let backend: Arc<dyn KeyValueStore> = match &self.backend {
            BackendConfig::Memory { capacity: Some(cap) } => {
                Arc::new(InMemoryBackend::with_capacity(*cap))
            }
            BackendConfig::Memory { capacity: None } => Arc::new(InMemoryBackend::unbounded()),
            BackendConfig::File { path, capacity } => Arc::new(FileBackend::open(path, *capacity)?),
        };
        Ok(backend)
    }
}
