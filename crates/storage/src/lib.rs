#![forbid(unsafe_code)]

pub mod file;
pub mod repository;
pub mod slots;

pub use file::JsonFileStore;
pub use repository::{InMemoryStore, KeyValueStore, Storage, StorageError};
pub use slots::{ActiveSessionLock, CredentialSlot, LockState};
