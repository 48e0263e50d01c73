//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Entries and state live behind one `std::sync::RwLock`, which makes
//! `commit_batch` trivially atomic.

use async_trait::async_trait;
use std::sync::RwLock;

use crate::error::{SyncError, SyncResult};
use crate::models::{CatalogEntry, SyncState};

use super::Store;

#[derive(Default)]
struct Inner {
    state: Option<SyncState>,
    /// Index 0 is the most recent entry.
    entries: Vec<CatalogEntry>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a sync state.
    pub fn with_state(state: SyncState) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: Some(state),
                entries: Vec::new(),
            }),
        }
    }
}

fn poisoned() -> SyncError {
    SyncError::PersistenceError("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn load_state(&self) -> SyncResult<Option<SyncState>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.state.clone())
    }

    async fn save_state(&self, state: &SyncState) -> SyncResult<()> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.state = Some(state.clone());
        Ok(())
    }

    async fn set_offset(&self, offset: i64) -> SyncResult<()> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        match inner.state.as_mut() {
            Some(state) => {
                state.offset = offset;
                Ok(())
            }
            None => Err(SyncError::PersistenceError(
                "sync state not initialized".to_string(),
            )),
        }
    }

    async fn list_entries(&self) -> SyncResult<Vec<CatalogEntry>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.entries.clone())
    }

    async fn entry_exists(&self, id: &str) -> SyncResult<bool> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.entries.iter().any(|e| e.id == id))
    }

    async fn insert_front(&self, entry: &CatalogEntry) -> SyncResult<()> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if inner.entries.iter().any(|e| e.id == entry.id) {
            return Err(SyncError::PersistenceError(format!(
                "duplicate entry id: {}",
                entry.id
            )));
        }
        inner.entries.insert(0, entry.clone());
        Ok(())
    }

    async fn commit_batch(&self, entries: &[CatalogEntry], offset: i64) -> SyncResult<()> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if inner.state.is_none() {
            return Err(SyncError::PersistenceError(
                "sync state not initialized".to_string(),
            ));
        }
        // validate before mutating anything
        for (i, entry) in entries.iter().enumerate() {
            let clash = inner.entries.iter().any(|e| e.id == entry.id)
                || entries[..i].iter().any(|e| e.id == entry.id);
            if clash {
                return Err(SyncError::PersistenceError(format!(
                    "duplicate entry id: {}",
                    entry.id
                )));
            }
        }
        for entry in entries {
            inner.entries.insert(0, entry.clone());
        }
        if let Some(state) = inner.state.as_mut() {
            state.offset = offset;
        }
        Ok(())
    }
}
