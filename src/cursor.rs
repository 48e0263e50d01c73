//! Sync cursor management.
//!
//! The cursor is the high-water mark of the remote inbox: the identifier of
//! the last update seen plus one. Everything below it counts as processed and
//! is never requested again, which is the only thing preventing a re-poll
//! from re-importing old messages.
//!
//! Advancing is two-step. [`SyncCursor::advance_to`] only moves the pending
//! offset in memory; [`SyncCursor::commit`] persists it together with the
//! catalog entries produced from the same updates, in one store transaction.
//! A failed commit leaves the durable offset where it was.

use std::sync::Arc;
use tracing::debug;

use crate::error::SyncResult;
use crate::models::{CatalogEntry, SyncState};
use crate::store::Store;

pub struct SyncCursor {
    store: Arc<dyn Store>,
    state: SyncState,
    pending: i64,
}

impl SyncCursor {
    /// Load the persisted state, creating it from `defaults` on first run.
    pub async fn load(store: Arc<dyn Store>, defaults: SyncState) -> SyncResult<Self> {
        let state = match store.load_state().await? {
            Some(state) => state,
            None => {
                store.save_state(&defaults).await?;
                defaults
            }
        };
        let pending = state.offset;
        Ok(Self {
            store,
            state,
            pending,
        })
    }

    /// State as of the last load or commit.
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Durable offset.
    pub fn current_offset(&self) -> i64 {
        self.state.offset
    }

    /// Offset the next commit will persist.
    pub fn pending_offset(&self) -> i64 {
        self.pending
    }

    /// Move the pending offset forward. Regressions are ignored; returns
    /// whether the offset moved.
    pub fn advance_to(&mut self, new_offset: i64) -> bool {
        if new_offset <= self.pending {
            return false;
        }
        self.pending = new_offset;
        true
    }

    /// Persist offset 0 so the next fetch replays the whole inbox.
    pub async fn reset_to_beginning(&mut self) -> SyncResult<()> {
        self.store.set_offset(0).await?;
        self.state.offset = 0;
        self.pending = 0;
        debug!("cursor reset to beginning");
        Ok(())
    }

    /// Atomically persist `entries` and the pending offset.
    pub async fn commit(&mut self, entries: &[CatalogEntry]) -> SyncResult<()> {
        if entries.is_empty() && self.pending == self.state.offset {
            return Ok(());
        }
        match self.store.commit_batch(entries, self.pending).await {
            Ok(()) => {
                self.state.offset = self.pending;
                debug!(offset = self.pending, entries = entries.len(), "cursor committed");
                Ok(())
            }
            Err(e) => {
                self.pending = self.state.offset;
                Err(e)
            }
        }
    }
}
