use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::file::JsonFileStore;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

/// Small string key-value capability shared between attempt sessions.
///
/// Plays the role browser local storage plays for a web host: every session
/// on the same machine sees the same slots. Calls are synchronous so
/// detectors can read them inside a single tick.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Remove `key` only while it still holds `expected`.
    ///
    /// Returns whether the key was removed. Not atomic across processes; a
    /// lost race leaves the other writer's value in place.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read or written.
    fn remove_if(&self, key: &str, expected: &str) -> Result<bool, StorageError> {
        match self.get(key)? {
            Some(current) if current == expected => {
                self.remove(key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Simple in-memory store for tests and single-process hosts.
///
/// Clones share the same map, so two sessions built from clones behave like
/// two tabs of one browser.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }

    fn remove_if(&self, key: &str, expected: &str) -> Result<bool, StorageError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.get(key).is_some_and(|current| current == expected) {
            guard.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

/// Shared store behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub shared: Arc<dyn KeyValueStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let shared: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        Self { shared }
    }

    /// Build a `Storage` persisted as JSON under `dir`, visible to every
    /// process pointed at the same directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the directory cannot be created.
    pub fn json_dir(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let shared: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(dir)?);
        Ok(Self { shared })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_slots() {
        let tab_a = InMemoryStore::new();
        let tab_b = tab_a.clone();
        tab_a.set("k", "v").unwrap();
        assert_eq!(tab_b.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn remove_if_only_removes_matching_value() {
        let store = InMemoryStore::new();
        store.set("k", "mine").unwrap();
        assert!(!store.remove_if("k", "theirs").unwrap());
        assert_eq!(store.get("k").unwrap().as_deref(), Some("mine"));
        assert!(store.remove_if("k", "mine").unwrap());
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn removing_missing_key_is_ok() {
        let store = InMemoryStore::new();
        store.remove("missing").unwrap();
        assert!(!store.remove_if("missing", "x").unwrap());
    }
}
