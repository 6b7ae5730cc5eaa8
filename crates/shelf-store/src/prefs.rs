//! A single typed settings document with defaults.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use shelf_codec::{Codec, JsonCodec};

use crate::error::StoreResult;
use crate::namespaced::NamespacedStore;

/// Key the preferences document is stored under unless told otherwise.
pub const DEFAULT_PREFERENCES_KEY: &str = "preferences";

/// User preferences persisted as one document in a namespace.
///
/// Reads never fail: a missing or unreadable document yields `T::default()`.
/// Mark `T` with `#[serde(default)]` so documents saved by an older version
/// of `T` pick up defaults for fields added since.
pub struct Preferences<T, C: Codec = JsonCodec> {
    store: NamespacedStore<C>,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C> Preferences<T, C>
where
    T: Serialize + DeserializeOwned + Default,
    C: Codec,
{
    pub fn new(store: NamespacedStore<C>) -> Self {
        Self::with_key(store, DEFAULT_PREFERENCES_KEY)
    }

    pub fn with_key(store: NamespacedStore<C>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            _marker: PhantomData,
        }
    }

    /// The stored preferences, or the defaults.
    pub fn load(&self) -> T {
        self.store.get_item_or(&self.key, T::default())
    }

    pub fn save(&self, prefs: &T) -> StoreResult<()> {
        self.store.set_item(&self.key, prefs)
    }

    /// Load, apply `edit`, save, and return the saved preferences.
    pub fn update<F: FnOnce(&mut T)>(&self, edit: F) -> StoreResult<T> {
        let mut prefs = self.load();
        edit(&mut prefs);
        self.save(&prefs)?;
        Ok(prefs)
    }

    /// Drop the stored document so the next load returns defaults.
    pub fn reset(&self) -> StoreResult<()> {
        self.store.remove_item(&self.key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde::Deserialize;
    use shelf_backend::{InMemoryBackend, KeyValueStore};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct UiPrefs {
        theme: String,
        font_size: u8,
        notifications: bool,
    }

    impl Default for UiPrefs {
        fn default() -> Self {
            Self {
                theme: "light".into(),
                font_size: 14,
                notifications: true,
            }
        }
    }

    fn prefs() -> (Arc<dyn KeyValueStore>, Preferences<UiPrefs>) {
        let backend: Arc<dyn KeyValueStore> = Arc::new(InMemoryBackend::new());
        let prefs = Preferences::new(NamespacedStore::new(backend.clone(), "settings_"));
        (backend, prefs)
    }

    #[test]
    fn load_without_document_gives_defaults() {
        let (_, prefs) = prefs();
        assert_eq!(prefs.load(), UiPrefs::default());
    }

    #[test]
    fn update_persists() {
        let (backend, prefs) = prefs();
        let saved = prefs.update(|p| p.theme = "dark".into()).unwrap();
        assert_eq!(saved.theme, "dark");
        assert_eq!(prefs.load().theme, "dark");
        assert!(backend.get("settings_preferences").unwrap().is_some());
    }

    #[test]
    fn partial_document_fills_missing_fields() {
        let (backend, prefs) = prefs();
        backend
            .set("settings_preferences", r#"{"theme":"solarized"}"#)
            .unwrap();
        let loaded = prefs.load();
        assert_eq!(loaded.theme, "solarized");
        assert_eq!(loaded.font_size, 14);
        assert!(loaded.notifications);
    }

    #[test]
    fn corrupt_document_gives_defaults() {
        let (backend, prefs) = prefs();
        backend.set("settings_preferences", "][").unwrap();
        assert_eq!(prefs.load(), UiPrefs::default());
    }

    #[test]
    fn reset_restores_defaults() {
        let (_, prefs) = prefs();
        prefs.update(|p| p.font_size = 20).unwrap();
        prefs.reset().unwrap();
        assert_eq!(prefs.load(), UiPrefs::default());
        prefs.reset().unwrap();
    }

    #[test]
    fn custom_key() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(InMemoryBackend::new());
        let prefs: Preferences<UiPrefs> =
            Preferences::with_key(NamespacedStore::new(backend.clone(), "u1_"), "ui");
        prefs.save(&UiPrefs::default()).unwrap();
        assert!(backend.get("u1_ui").unwrap().is_some());
    }
}
