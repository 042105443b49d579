use std::sync::Arc;

use quiz_core::model::{QuizId, SessionId};

use crate::repository::{KeyValueStore, StorageError};

const ACTIVE_SESSION_PREFIX: &str = "active_quiz_session:";
const CREDENTIAL_KEY: &str = "auth_token";

/// What the shared active-session slot held when checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// The slot holds our session id.
    Held,
    /// The slot is empty (cleared by a finished attempt or never written).
    Vacant,
    /// Another session claimed the quiz after us.
    Taken(SessionId),
}

/// Cooperative cross-session lock: one active session id per quiz.
///
/// Last writer wins. The session whose id is no longer in the slot is the
/// one that lost the race.
#[derive(Clone)]
pub struct ActiveSessionLock {
    store: Arc<dyn KeyValueStore>,
    key: String,
    session_id: SessionId,
}

impl ActiveSessionLock {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, quiz_id: &QuizId, session_id: SessionId) -> Self {
        Self {
            store,
            key: format!("{ACTIVE_SESSION_PREFIX}{quiz_id}"),
            session_id,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Write our session id into the slot, displacing any previous holder.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be written.
    pub fn claim(&self) -> Result<(), StorageError> {
        self.store.set(&self.key, self.session_id.as_str())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be read.
    pub fn check(&self) -> Result<LockState, StorageError> {
        Ok(match self.store.get(&self.key)? {
            None => LockState::Vacant,
            Some(current) if current == self.session_id.as_str() => LockState::Held,
            Some(other) => LockState::Taken(SessionId::from_raw(other)),
        })
    }

    /// Clear the slot if it still holds our id; a newer holder is left alone.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be read or written.
    pub fn release(&self) -> Result<bool, StorageError> {
        self.store.remove_if(&self.key, self.session_id.as_str())
    }
}

/// Persisted auth credential shared with the rest of the host.
#[derive(Clone)]
pub struct CredentialSlot {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialSlot {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be read.
    pub fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .store
            .get(CREDENTIAL_KEY)?
            .filter(|token| !token.trim().is_empty()))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be written.
    pub fn save(&self, token: &str) -> Result<(), StorageError> {
        self.store.set(CREDENTIAL_KEY, token)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be written.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(CREDENTIAL_KEY)
    }
}
