//! Sync status and catalog listing.
//!
//! Used by `harvest status` and `harvest catalog` to show what the last
//! passes did without talking to the remote inbox.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::models::CatalogEntry;
use crate::store::sqlite::{SqliteStore, STATE_KEY};
use crate::store::Store;

/// Print settings, cursor, and catalog counts.
pub async fn run_status(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let pool = store.pool();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_entries")
        .fetch_one(pool)
        .await?;
    let local: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM catalog_entries WHERE local_file IS NOT NULL")
            .fetch_one(pool)
            .await?;
    let last_sync: Option<i64> =
        sqlx::query("SELECT updated_at FROM sync_state WHERE id = ?")
            .bind(STATE_KEY)
            .fetch_optional(pool)
            .await?
            .map(|row| row.get("updated_at"));

    let state = store.load_state().await?;
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Inbox Harvest Status");
    println!("====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Uploads:     {}", config.storage.uploads_dir.display());
    println!();

    match &state {
        Some(state) => {
            let chat = if state.chat_id.is_empty() {
                config
                    .telegram
                    .default_chat_id
                    .clone()
                    .map(|c| format!("{} (default)", c))
                    .unwrap_or_else(|| "not set".to_string())
            } else {
                state.chat_id.clone()
            };
            let token = if state.bot_token.is_some() {
                "stored"
            } else if std::env::var(crate::config::BOT_TOKEN_ENV).is_ok() {
                "from environment"
            } else {
                "not set"
            };
            println!("  Chat:        {}", chat);
            println!("  Bot token:   {}", token);
            println!("  Mode:        {}", state.mode);
            println!("  Offset:      {}", state.offset);
        }
        None => println!("  Sync state:  not initialized (run `harvest sync`)"),
    }
    println!(
        "  Last change: {}",
        last_sync
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Entries:     {}", total);
    println!("    local:     {}", local);
    println!("    remote:    {}", total - local);
    println!();

    store.close().await;
    Ok(())
}

/// Print the newest `limit` catalog entries.
pub async fn run_catalog(config: &Config, limit: usize) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let entries = store.list_entries().await?;

    if entries.is_empty() {
        println!("Catalog is empty.");
    } else {
        println!("{:<28} {:<8} {:<17} TITLE", "ID", "STORAGE", "ADDED");
        println!("{}", "-".repeat(80));
        for entry in entries.iter().take(limit) {
            print_entry(entry);
        }
        if entries.len() > limit {
            println!("... and {} more", entries.len() - limit);
        }
    }

    store.close().await;
    Ok(())
}

fn print_entry(entry: &CatalogEntry) {
    let kind = if entry.storage.local_file().is_some() {
        "local"
    } else {
        "remote"
    };
    println!(
        "{:<28} {:<8} {:<17} {}",
        entry.id,
        kind,
        format_ts_iso(entry.created_at.timestamp()),
        entry.title
    );
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
