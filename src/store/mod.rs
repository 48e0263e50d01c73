//! Storage abstraction for the catalog and the sync state.
//!
//! The [`Store`] trait covers everything the sync engine persists: catalog
//! entries (most recent first) and the single [`SyncState`] row. The key
//! operation is [`commit_batch`](Store::commit_batch), which writes a page
//! worth of new entries together with the advanced offset as one atomic
//! unit, so the offset can never run ahead of the entries it accounts for.
//!
//! Implementations must be `Send + Sync` to be shared across the push worker,
//! the HTTP server and CLI passes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::models::{CatalogEntry, SyncState};

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load_state`](Store::load_state) | Read the sync state, if created |
/// | [`save_state`](Store::save_state) | Create or overwrite the sync state |
/// | [`set_offset`](Store::set_offset) | Overwrite only the offset |
/// | [`list_entries`](Store::list_entries) | All entries, most recent first |
/// | [`entry_exists`](Store::entry_exists) | Identifier lookup |
/// | [`insert_front`](Store::insert_front) | Add one entry at the front |
/// | [`commit_batch`](Store::commit_batch) | Entries + offset, atomically |
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_state(&self) -> SyncResult<Option<SyncState>>;

    async fn save_state(&self, state: &SyncState) -> SyncResult<()>;

    /// Fails with `PersistenceError` if no state has been saved yet.
    async fn set_offset(&self, offset: i64) -> SyncResult<()>;

    async fn list_entries(&self) -> SyncResult<Vec<CatalogEntry>>;

    async fn entry_exists(&self, id: &str) -> SyncResult<bool>;

    async fn insert_front(&self, entry: &CatalogEntry) -> SyncResult<()>;

    /// Insert `entries` in order, each at the front, and set the offset.
    /// Either everything is applied or nothing is.
    async fn commit_batch(&self, entries: &[CatalogEntry], offset: i64) -> SyncResult<()>;
}
