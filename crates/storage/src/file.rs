use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fd_lock::RwLock;
use tempfile::NamedTempFile;

use crate::repository::{KeyValueStore, StorageError};

const STORE_FILE: &str = "shared-slots.json";
const LOCK_FILE: &str = "shared-slots.lock";

/// Key-value store kept as one JSON object on disk.
///
/// Every call re-reads the file so writes from other processes are observed
/// on the next poll. A read-modify-write holds an exclusive advisory lock on
/// a sibling lock file and replaces the map through a uniquely named temp
/// file, so writers in different processes serialize instead of clobbering
/// each other's keys.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    path: PathBuf,
    lock: Mutex<RwLock<File>>,
}

impl JsonFileStore {
    /// Open (creating if needed) the store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(io_error)?;
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE))
            .map_err(io_error)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            path: dir.join(STORE_FILE),
            lock: Mutex::new(RwLock::new(lock_file)),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(io_error(e)),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn write_all(&self, slots: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let body = serde_json::to_string_pretty(slots)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_error)?;
        tmp.write_all(body.as_bytes()).map_err(io_error)?;
        tmp.persist(&self.path)
            .map(drop)
            .map_err(|e| io_error(e.error))
    }

    fn update<T>(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> Result<T, StorageError> {
        let mut lock = self
            .lock
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let _held = lock.write().map_err(io_error)?;
        let mut slots = self.read_all()?;
        let out = apply(&mut slots);
        self.write_all(&slots)?;
        Ok(out)
    }
}

fn io_error(err: std::io::Error) -> StorageError {
    StorageError::Io(err.to_string())
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|slots| {
            slots.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|slots| {
            slots.remove(key);
        })
    }

    fn remove_if(&self, key: &str, expected: &str) -> Result<bool, StorageError> {
        self.update(|slots| {
            if slots.get(key).is_some_and(|current| current == expected) {
                slots.remove(key);
                true
            } else {
                false
            }
        })
    }
}
