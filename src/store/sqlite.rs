//! SQLite-backed [`Store`] implementation.
//!
//! Catalog order is kept in a `position` column that only grows; "insert at
//! the front" means "insert with the next position", and listings read
//! `ORDER BY position DESC`. Batch commits run in a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::config::Config;
use crate::db;
use crate::error::{SyncError, SyncResult};
use crate::migrate;
use crate::models::{CatalogEntry, EntryOrigin, StorageDescriptor, SyncState};

use super::Store;

/// Row key of the one sync state this store tracks.
pub const STATE_KEY: &str = "telegram";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_entry(row: &SqliteRow) -> SyncResult<CatalogEntry> {
    let id: String = row.get("id");
    let origin: String = row.get("origin");
    let origin = origin
        .parse::<EntryOrigin>()
        .map_err(SyncError::PersistenceError)?;
    let storage = StorageDescriptor::from_columns(row.get("local_file"), row.get("remote_file_ref"))
        .ok_or_else(|| {
            SyncError::PersistenceError(format!("entry {} has no single storage descriptor", id))
        })?;
    let created_ms: i64 = row.get("created_at");

    Ok(CatalogEntry {
        title: row.get("title"),
        origin,
        storage,
        owner_id: row.get("owner_id"),
        owner_name: row.get("owner_name"),
        views: row.get("views"),
        likes: row.get("likes"),
        description: row.get("description"),
        created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_else(Utc::now),
        id,
    })
}

async fn insert_entry(tx: &mut Transaction<'_, Sqlite>, entry: &CatalogEntry) -> SyncResult<()> {
    sqlx::query(
        r#"
        INSERT INTO catalog_entries (id, position, title, origin, local_file, remote_file_ref,
                                     owner_id, owner_name, views, likes, description, created_at)
        VALUES (?, (SELECT COALESCE(MAX(position), 0) + 1 FROM catalog_entries),
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.title)
    .bind(entry.origin.as_str())
    .bind(entry.storage.local_file())
    .bind(entry.storage.remote_ref())
    .bind(&entry.owner_id)
    .bind(&entry.owner_name)
    .bind(entry.views)
    .bind(entry.likes)
    .bind(&entry.description)
    .bind(entry.created_at.timestamp_millis())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn write_offset(tx: &mut Transaction<'_, Sqlite>, offset: i64) -> SyncResult<()> {
    let result = sqlx::query("UPDATE sync_state SET last_offset = ?, updated_at = ? WHERE id = ?")
        .bind(offset)
        .bind(Utc::now().timestamp())
        .bind(STATE_KEY)
        .execute(&mut **tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(SyncError::PersistenceError(
            "sync state not initialized".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_state(&self) -> SyncResult<Option<SyncState>> {
        let row = sqlx::query(
            "SELECT chat_id, bot_token, last_offset, store_mode FROM sync_state WHERE id = ?",
        )
        .bind(STATE_KEY)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mode: String = row.get("store_mode");
        Ok(Some(SyncState {
            chat_id: row.get("chat_id"),
            bot_token: row.get("bot_token"),
            offset: row.get("last_offset"),
            mode: mode.parse().map_err(SyncError::PersistenceError)?,
        }))
    }

    async fn save_state(&self, state: &SyncState) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (id, chat_id, bot_token, last_offset, store_mode, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                chat_id = excluded.chat_id,
                bot_token = excluded.bot_token,
                last_offset = excluded.last_offset,
                store_mode = excluded.store_mode,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(STATE_KEY)
        .bind(&state.chat_id)
        .bind(&state.bot_token)
        .bind(state.offset)
        .bind(state.mode.as_str())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_offset(&self, offset: i64) -> SyncResult<()> {
        let mut tx = self.pool.begin().await?;
        write_offset(&mut tx, offset).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_entries(&self) -> SyncResult<Vec<CatalogEntry>> {
        let rows = sqlx::query("SELECT * FROM catalog_entries ORDER BY position DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn entry_exists(&self, id: &str) -> SyncResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM catalog_entries WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn insert_front(&self, entry: &CatalogEntry) -> SyncResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_batch(&self, entries: &[CatalogEntry], offset: i64) -> SyncResult<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            insert_entry(&mut tx, entry).await?;
        }
        write_offset(&mut tx, offset).await?;
        // dropping `tx` on an early return above rolls everything back
        tx.commit().await?;
        Ok(())
    }
}
