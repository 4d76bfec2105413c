//! Thread-store persistence.
//!
//! Conversation state is persisted as one opaque blob per session key,
//! read-modify-written whole on every turn step. The engine behind the
//! store (relational, object storage, ...) is out of scope; this module
//! defines the contract and ships an in-memory implementation used by
//! tests and embedders.

use crate::error::StoreError;
use crate::history::History;
use crate::session::SessionState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use taleweaver_core::SessionId;

/// Trait for opaque per-session blob storage.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Loads the blob for `key`, or `None` if absent.
    async fn load(&self, key: &SessionId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Saves the blob for `key`, replacing any previous value.
    async fn save(&self, key: &SessionId, blob: &[u8]) -> Result<(), StoreError>;

    /// Deletes the blob for `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &SessionId) -> Result<(), StoreError>;
}

/// The full persisted form of one session.
///
/// The system prompt is deliberately absent: it is recomputed from the
/// dispatcher's instructions after every load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Turn list and continuity messages, annotations folded in.
    pub history: History,
    /// Protocol counters and phase.
    pub state: SessionState,
    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Creates a snapshot taken now.
    #[must_use]
    pub fn new(history: History, state: SessionState) -> Self {
        Self {
            history,
            state,
            saved_at: Utc::now(),
        }
    }

    /// Encodes the snapshot as a JSON blob.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SaveFailed` if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::SaveFailed {
            reason: e.to_string(),
        })
    }

    /// Decodes a snapshot from a JSON blob.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Corrupt` if the blob cannot be decoded.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
            reason: e.to_string(),
        })
    }
}

/// In-process thread store backed by a map.
#[derive(Debug, Default)]
pub struct MemoryThreadStore {
    entries: Mutex<HashMap<SessionId, Vec<u8>>>,
}

impl MemoryThreadStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadStore for MemoryThreadStore {
    async fn load(&self, key: &SessionId) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::LoadFailed {
            reason: "store lock poisoned".to_string(),
        })?;
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &SessionId, blob: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::SaveFailed {
            reason: "store lock poisoned".to_string(),
        })?;
        entries.insert(*key, blob.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &SessionId) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::DeleteFailed {
            reason: "store lock poisoned".to_string(),
        })?;
        entries.remove(key);
        Ok(())
    }
}
