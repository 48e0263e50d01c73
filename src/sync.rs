//! Sync driver.
//!
//! Runs the pull loop and handles single push deliveries. Both paths feed
//! every update through the same steps:
//!
//! ```text
//! fetch page ──▶ advance cursor ──▶ classify ──▶ build entry ──▶ commit page
//!   (retry)      (every update)     (skip?)     (fail? skip)    (entries + offset)
//! ```
//!
//! The cursor moves past every update that was seen, imported or not, so a
//! message that can never be classified does not block the inbox. A page is
//! committed (its entries and the offset after it) in one store transaction;
//! a fetch failure on a later page aborts the pass but keeps earlier pages.
//!
//! At most one pass runs at a time per engine. A pull pass that finds the
//! lock taken is rejected with [`SyncError::SyncInProgress`]; push deliveries
//! wait their turn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::builder::{EntryBuilder, ImportPath};
use crate::classify::{classify, ChatFilter, Classification, SkipReason};
use crate::config::{Config, BOT_TOKEN_ENV};
use crate::cursor::SyncCursor;
use crate::error::{SyncError, SyncResult};
use crate::inbox_telegram::TelegramClient;
use crate::media_store::LocalMediaStorage;
use crate::models::{
    AddedEntry, CatalogEntry, ChatSummary, InboxPage, InboxReport, Owner, RawInboxMessage,
    StorageMode, SyncReport, SyncState,
};
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::store::sqlite::SqliteStore;
use crate::store::Store;
use crate::traits::{InboxClient, MediaStorage};

/// Largest page the Bot API hands out; used by inbox inspection.
const INSPECT_LIMIT: u32 = 100;

/// Engine tuning and fallbacks, usually built from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub page_size: u32,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// State written the first time the engine runs against an empty store.
    pub initial_state: SyncState,
    /// Chat filter used when the stored one is empty.
    pub default_chat_id: Option<String>,
    /// Credential used when the stored one is empty.
    pub fallback_token: Option<String>,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.sync.page_size,
            max_retries: config.sync.max_retries,
            retry_backoff: Duration::from_millis(config.sync.retry_backoff_ms),
            initial_state: SyncState::new(
                config.telegram.default_chat_id.clone().unwrap_or_default(),
                config.telegram.bot_token.clone(),
                config.default_storage_mode(),
            ),
            default_chat_id: config.telegram.default_chat_id.clone(),
            fallback_token: std::env::var(BOT_TOKEN_ENV).ok(),
        }
    }
}

/// Options for a pull pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Reset the cursor to 0 before fetching.
    pub from_beginning: bool,
}

/// What happened to a pushed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Imported(AddedEntry),
    Skipped(SkipReason),
}

enum MessageOutcome {
    Imported(CatalogEntry),
    Skipped(SkipReason),
    Failed(SyncError),
}

pub struct SyncEngine {
    store: Arc<dyn Store>,
    inbox: Arc<dyn InboxClient>,
    storage: Arc<dyn MediaStorage>,
    owner: Owner,
    options: EngineOptions,
    lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn Store>,
        inbox: Arc<dyn InboxClient>,
        storage: Arc<dyn MediaStorage>,
        owner: Owner,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            inbox,
            storage,
            owner,
            options,
            lock: Mutex::new(()),
        }
    }

    /// Wire the engine to the configured database, uploads directory and
    /// Bot API endpoint.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = SqliteStore::open(config).await?;
        let inbox = TelegramClient::new(
            &config.telegram.api_base,
            Duration::from_secs(config.telegram.timeout_secs),
        )?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(inbox),
            Arc::new(LocalMediaStorage::new(&config.storage.uploads_dir)),
            config.owner.to_owner(),
            EngineOptions::from_config(config),
        ))
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run one pull pass over all pending pages.
    ///
    /// Fails with `ConfigMissing` before touching anything when no credential
    /// or chat filter is configured, with `RemoteUnavailable` when a page
    /// cannot be fetched (pages committed before it stay committed), and with
    /// `PersistenceError` when a page commit fails.
    pub async fn run_sync(
        &self,
        opts: SyncOptions,
        progress: &dyn SyncProgressReporter,
    ) -> SyncResult<SyncReport> {
        let _guard = self.lock.try_lock().map_err(|_| SyncError::SyncInProgress)?;

        let mut cursor = SyncCursor::load(self.store.clone(), self.options.initial_state.clone()).await?;
        let (token, filter) = self.credentials(cursor.state())?;
        if opts.from_beginning {
            cursor.reset_to_beginning().await?;
        }
        let mode = cursor.state().mode;

        let mut report = SyncReport::default();
        loop {
            report.pages += 1;
            let offset = cursor.pending_offset();
            progress.report(SyncProgressEvent::Fetching {
                page: report.pages,
                offset,
            });

            let page = self.fetch_with_retry(&token, offset, self.options.page_size).await?;
            let full_page = page.updates.len() as u32 >= self.options.page_size;
            let total = page.updates.len() as u64;

            let mut batch = Vec::new();
            for (i, msg) in page.updates.iter().enumerate() {
                // past every seen update, accepted or not
                cursor.advance_to(msg.update_id + 1);
                report.updates_seen += 1;

                match self.import_one(msg, &filter, mode, &token, ImportPath::Pull).await {
                    MessageOutcome::Imported(entry) => batch.push(entry),
                    MessageOutcome::Skipped(_) => report.skipped += 1,
                    MessageOutcome::Failed(e) if e.is_per_message() => report.failed += 1,
                    MessageOutcome::Failed(e) => {
                        self.discard_files(&batch).await;
                        return Err(e);
                    }
                }

                progress.report(SyncProgressEvent::Importing {
                    page: report.pages,
                    n: i as u64 + 1,
                    total,
                });
            }
            if let Some(next) = page.next_offset {
                cursor.advance_to(next);
            }

            if let Err(e) = cursor.commit(&batch).await {
                self.discard_files(&batch).await;
                return Err(e);
            }
            report.added.extend(batch.iter().map(|e| AddedEntry {
                id: e.id.clone(),
                title: e.title.clone(),
            }));

            if !full_page {
                break;
            }
            if cursor.current_offset() <= offset {
                warn!(offset, "full page did not move the cursor; stopping pass");
                break;
            }
        }

        report.added_count = report.added.len();
        report.offset = cursor.current_offset();
        info!(
            added = report.added_count,
            seen = report.updates_seen,
            skipped = report.skipped,
            failed = report.failed,
            offset = report.offset,
            "sync pass finished"
        );
        Ok(report)
    }

    /// Import a single pushed update.
    ///
    /// Waits for any running pass to finish. The cursor is advanced past the
    /// update on a best-effort basis.
    pub async fn handle_push(&self, raw: RawInboxMessage) -> SyncResult<PushOutcome> {
        let _guard = self.lock.lock().await;

        let mut cursor = SyncCursor::load(self.store.clone(), self.options.initial_state.clone()).await?;
        let (token, filter) = self.credentials(cursor.state())?;
        let mode = cursor.state().mode;
        cursor.advance_to(raw.update_id + 1);

        match self.import_one(&raw, &filter, mode, &token, ImportPath::Push).await {
            MessageOutcome::Imported(entry) => {
                if let Err(e) = cursor.commit(std::slice::from_ref(&entry)).await {
                    self.discard_files(std::slice::from_ref(&entry)).await;
                    return Err(e);
                }
                info!(entry_id = %entry.id, title = %entry.title, "push import added entry");
                Ok(PushOutcome::Imported(AddedEntry {
                    id: entry.id,
                    title: entry.title,
                }))
            }
            MessageOutcome::Skipped(reason) => {
                self.commit_offset_best_effort(&mut cursor).await;
                Ok(PushOutcome::Skipped(reason))
            }
            MessageOutcome::Failed(e) => {
                self.commit_offset_best_effort(&mut cursor).await;
                Err(e)
            }
        }
    }

    /// Scan the first page of the remote inbox and count messages per chat.
    ///
    /// Always reads from offset 0 and never pages further: requesting a
    /// higher offset would confirm updates server-side that a pull pass has
    /// not imported yet. SyncState is not touched.
    pub async fn inspect_inbox(&self) -> SyncResult<InboxReport> {
        let state = self
            .store
            .load_state()
            .await?
            .unwrap_or_else(|| self.options.initial_state.clone());
        let token = self.token(&state)?;

        let page = self.fetch_with_retry(&token, 0, INSPECT_LIMIT).await?;

        let mut chats: Vec<ChatSummary> = Vec::new();
        let mut index: HashMap<i64, usize> = HashMap::new();
        for msg in &page.updates {
            let Some(chat) = &msg.chat else {
                continue;
            };
            let i = *index.entry(chat.id).or_insert_with(|| {
                chats.push(ChatSummary {
                    chat_id: chat.id,
                    title: chat.title.clone().unwrap_or_else(|| "Unknown".to_string()),
                    message_count: 0,
                    media_count: 0,
                });
                chats.len() - 1
            });
            chats[i].message_count += 1;
            if msg.media.as_ref().is_some_and(|m| m.kind.is_video()) {
                chats[i].media_count += 1;
            }
        }

        Ok(InboxReport {
            total_updates: page.updates.len(),
            chats,
        })
    }

    fn token(&self, state: &SyncState) -> SyncResult<String> {
        effective_token(state, self.options.fallback_token.as_deref())
    }

    fn credentials(&self, state: &SyncState) -> SyncResult<(String, ChatFilter)> {
        let token = self.token(state)?;
        let chat = non_blank(Some(state.chat_id.as_str()))
            .or_else(|| non_blank(self.options.default_chat_id.as_deref()))
            .ok_or_else(|| {
                SyncError::ConfigMissing(
                    "no chat id configured (use `harvest configure --chat-id`)".to_string(),
                )
            })?;
        let filter = ChatFilter::parse(chat)
            .ok_or_else(|| SyncError::ConfigMissing(format!("chat id '{}' is not numeric", chat)))?;
        Ok((token, filter))
    }

    async fn fetch_with_retry(&self, token: &str, offset: i64, limit: u32) -> SyncResult<InboxPage> {
        let mut attempt = 0;
        loop {
            match self.inbox.fetch_pending(token, offset, limit).await {
                Ok(page) => return Ok(page),
                Err(SyncError::RemoteUnavailable(msg)) if attempt < self.options.max_retries => {
                    let delay = backoff_delay(self.options.retry_backoff, attempt);
                    warn!(
                        offset,
                        attempt = attempt + 1,
                        error = %msg,
                        "fetching updates failed; retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn import_one(
        &self,
        msg: &RawInboxMessage,
        filter: &ChatFilter,
        mode: StorageMode,
        token: &str,
        path: ImportPath,
    ) -> MessageOutcome {
        let descriptor = match classify(msg, filter) {
            Classification::Accept(d) => d,
            Classification::Skip(reason) => {
                debug!(update_id = msg.update_id, %reason, "update skipped");
                return MessageOutcome::Skipped(reason);
            }
        };

        let builder = EntryBuilder {
            inbox: self.inbox.as_ref(),
            storage: self.storage.as_ref(),
            store: self.store.as_ref(),
            owner: &self.owner,
            token,
        };
        match builder.build(&descriptor, mode, path).await {
            Ok(entry) => {
                debug!(update_id = msg.update_id, entry_id = %entry.id, "entry built");
                MessageOutcome::Imported(entry)
            }
            Err(e) => {
                warn!(
                    update_id = descriptor.update_id,
                    chat_id = descriptor.chat_id,
                    file_ref = %descriptor.file_ref,
                    error = %e,
                    "import failed; message skipped"
                );
                MessageOutcome::Failed(e)
            }
        }
    }

    async fn commit_offset_best_effort(&self, cursor: &mut SyncCursor) {
        if let Err(e) = cursor.commit(&[]).await {
            warn!(error = %e, "could not record push offset");
        }
    }

    /// Remove files written for entries that will never be committed.
    async fn discard_files(&self, entries: &[CatalogEntry]) {
        for entry in entries {
            if let Some(filename) = entry.storage.local_file() {
                if let Err(e) = self.storage.delete(filename).await {
                    warn!(filename, error = %e, "could not remove orphaned media file");
                }
            }
        }
    }
}

/// Stored credential, else `fallback` (normally the environment variable).
pub fn effective_token(state: &SyncState, fallback: Option<&str>) -> SyncResult<String> {
    non_blank(state.bot_token.as_deref())
        .or_else(|| non_blank(fallback))
        .map(str::to_string)
        .ok_or_else(|| {
            SyncError::ConfigMissing(format!(
                "no bot token configured (use `harvest configure --bot-token` or set {})",
                BOT_TOKEN_ENV
            ))
        })
}

/// `base * 2^attempt`, with the exponent capped at 5 and no overflow.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(5))
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 9), Duration::from_millis(3200));
    }

    #[test]
    fn backoff_saturates_instead_of_panicking() {
        let base = Duration::from_millis(u64::MAX);
        assert_eq!(backoff_delay(base, 5), Duration::MAX);
    }
}
