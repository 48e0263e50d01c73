use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Exactly one of local_file / remote_file_ref is set
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_entries (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            title TEXT NOT NULL,
            origin TEXT NOT NULL,
            local_file TEXT,
            remote_file_ref TEXT,
            owner_id TEXT NOT NULL,
            owner_name TEXT NOT NULL,
            views INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            description TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            CHECK ((local_file IS NULL) <> (remote_file_ref IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_state (
            id TEXT PRIMARY KEY,
            chat_id TEXT NOT NULL DEFAULT '',
            bot_token TEXT,
            last_offset INTEGER NOT NULL DEFAULT 0,
            store_mode TEXT NOT NULL DEFAULT 'download',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_catalog_entries_position ON catalog_entries(position DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
