//! End-to-end behaviour of the sync engine against a scripted inbox.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

use inbox_harvest::error::{SyncError, SyncResult};
use inbox_harvest::media_store::LocalMediaStorage;
use inbox_harvest::models::{
    CatalogEntry, ChatRef, InboxPage, MediaKind, MediaPayload, Owner, RawInboxMessage,
    StorageMode, SyncState,
};
use inbox_harvest::progress::NoProgress;
use inbox_harvest::store::memory::InMemoryStore;
use inbox_harvest::store::Store;
use inbox_harvest::sync::{EngineOptions, PushOutcome, SyncEngine, SyncOptions};
use inbox_harvest::traits::InboxClient;

// ═══════════════════════════════════════════════════════════════════════
// Scripted inbox
// ═══════════════════════════════════════════════════════════════════════

/// Behaves like getUpdates: returns queued updates with id >= offset.
#[derive(Default)]
struct ScriptedInbox {
    updates: Vec<RawInboxMessage>,
    files: HashMap<String, Vec<u8>>,
    /// Fetches at or beyond this offset fail.
    fail_from_offset: Option<i64>,
    fetch_offsets: Mutex<Vec<i64>>,
    remote_file_calls: AtomicUsize,
    /// (entered, release): the first fetch signals `entered` and waits.
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

#[async_trait]
impl InboxClient for ScriptedInbox {
    async fn fetch_pending(&self, _token: &str, offset: i64, limit: u32) -> SyncResult<InboxPage> {
        self.fetch_offsets.lock().unwrap().push(offset);
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if self.fail_from_offset.is_some_and(|f| offset >= f) {
            return Err(SyncError::RemoteUnavailable("connection reset".into()));
        }
        let updates: Vec<RawInboxMessage> = self
            .updates
            .iter()
            .filter(|u| u.update_id >= offset)
            .take(limit as usize)
            .cloned()
            .collect();
        let next_offset = updates.iter().map(|u| u.update_id + 1).max();
        Ok(InboxPage {
            updates,
            next_offset,
        })
    }

    async fn resolve_file_location(&self, _token: &str, file_ref: &str) -> SyncResult<String> {
        self.remote_file_calls.fetch_add(1, Ordering::SeqCst);
        if self.files.contains_key(file_ref) {
            Ok(format!("videos/{}.mp4", file_ref))
        } else {
            Err(SyncError::FileUnavailable(format!("{} expired", file_ref)))
        }
    }

    async fn download_bytes(&self, _token: &str, location: &str) -> SyncResult<Vec<u8>> {
        self.remote_file_calls.fetch_add(1, Ordering::SeqCst);
        let file_ref = location
            .trim_start_matches("videos/")
            .trim_end_matches(".mp4");
        self.files
            .get(file_ref)
            .cloned()
            .ok_or_else(|| SyncError::TransferError("HTTP 404".into()))
    }
}

/// Delegates to an in-memory store but refuses to commit entries.
struct FailingCommitStore {
    inner: InMemoryStore,
}

#[async_trait]
impl Store for FailingCommitStore {
    async fn load_state(&self) -> SyncResult<Option<SyncState>> {
        self.inner.load_state().await
    }
    async fn save_state(&self, state: &SyncState) -> SyncResult<()> {
        self.inner.save_state(state).await
    }
    async fn set_offset(&self, offset: i64) -> SyncResult<()> {
        self.inner.set_offset(offset).await
    }
    async fn list_entries(&self) -> SyncResult<Vec<CatalogEntry>> {
        self.inner.list_entries().await
    }
    async fn entry_exists(&self, id: &str) -> SyncResult<bool> {
        self.inner.entry_exists(id).await
    }
    async fn insert_front(&self, entry: &CatalogEntry) -> SyncResult<()> {
        self.inner.insert_front(entry).await
    }
    async fn commit_batch(&self, entries: &[CatalogEntry], offset: i64) -> SyncResult<()> {
        if entries.is_empty() {
            return self.inner.commit_batch(entries, offset).await;
        }
        Err(SyncError::PersistenceError("disk full".into()))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════

fn message(update_id: i64, chat_id: i64, kind: Option<MediaKind>, file_ref: &str, caption: Option<&str>) -> RawInboxMessage {
    RawInboxMessage {
        update_id,
        chat: Some(ChatRef {
            id: chat_id,
            title: Some(format!("chat {}", chat_id)),
        }),
        caption: caption.map(str::to_string),
        media: kind.map(|kind| MediaPayload {
            kind,
            file_ref: file_ref.to_string(),
            file_name: None,
        }),
    }
}

fn video(update_id: i64, chat_id: i64, file_ref: &str, caption: &str) -> RawInboxMessage {
    message(update_id, chat_id, Some(MediaKind::Video), file_ref, Some(caption))
}

fn files(refs: &[&str]) -> HashMap<String, Vec<u8>> {
    refs.iter()
        .map(|r| (r.to_string(), format!("bytes of {}", r).into_bytes()))
        .collect()
}

fn options(mode: StorageMode, page_size: u32) -> EngineOptions {
    EngineOptions {
        page_size,
        max_retries: 0,
        retry_backoff: Duration::from_millis(1),
        initial_state: SyncState::new("12345", Some("123:abc".into()), mode),
        default_chat_id: None,
        fallback_token: None,
    }
}

struct Harness {
    _tmp: TempDir,
    uploads: std::path::PathBuf,
    store: Arc<dyn Store>,
    inbox: Arc<ScriptedInbox>,
    engine: Arc<SyncEngine>,
}

fn harness_with(inbox: ScriptedInbox, store: Arc<dyn Store>, options: EngineOptions) -> Harness {
    let tmp = TempDir::new().unwrap();
    let uploads = tmp.path().join("uploads");
    let inbox = Arc::new(inbox);
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        inbox.clone(),
        Arc::new(LocalMediaStorage::new(&uploads)),
        Owner {
            id: "user1".into(),
            name: "Demo User".into(),
        },
        options,
    ));
    Harness {
        _tmp: tmp,
        uploads,
        store,
        inbox,
        engine,
    }
}

fn harness(inbox: ScriptedInbox, mode: StorageMode) -> Harness {
    harness_with(inbox, Arc::new(InMemoryStore::new()), options(mode, 100))
}

fn uploaded_files(h: &Harness) -> usize {
    std::fs::read_dir(&h.uploads)
        .map(|d| d.count())
        .unwrap_or(0)
}

async fn offset(h: &Harness) -> i64 {
    h.store.load_state().await.unwrap().unwrap().offset
}

// ═══════════════════════════════════════════════════════════════════════
// Pull
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn imports_only_the_configured_chat_and_moves_past_everything() {
    let h = harness(
        ScriptedInbox {
            updates: vec![video(1, -12345, "F1", "A"), video(2, 99999, "F2", "B")],
            files: files(&["F1", "F2"]),
            ..Default::default()
        },
        StorageMode::Download,
    );

    let report = h.engine.run_sync(SyncOptions::default(), &NoProgress).await.unwrap();

    assert_eq!(report.added_count, 1);
    assert_eq!(report.added[0].title, "A");
    assert_eq!(report.skipped, 1);
    assert_eq!(report.offset, 3);
    assert_eq!(offset(&h).await, 3);

    let entries = h.store.list_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    let filename = entries[0].storage.local_file().unwrap();
    assert!(filename.ends_with(".mp4"));
    assert_eq!(
        std::fs::read(h.uploads.join(filename)).unwrap(),
        b"bytes of F1"
    );
    assert_eq!(entries[0].description, "Imported from Telegram");
    assert_eq!(entries[0].owner_id, "user1");
}

#[tokio::test]
async fn second_pass_imports_nothing() {
    let h = harness(
        ScriptedInbox {
            updates: vec![video(1, -12345, "F1", "A"), video(2, -12345, "F2", "B")],
            files: files(&["F1", "F2"]),
            ..Default::default()
        },
        StorageMode::Download,
    );

    let first = h.engine.run_sync(SyncOptions::default(), &NoProgress).await.unwrap();
    assert_eq!(first.added_count, 2);
    let second = h.engine.run_sync(SyncOptions::default(), &NoProgress).await.unwrap();
    assert_eq!(second.added_count, 0);
    assert_eq!(second.offset, 3);

    // most recent first: B was imported after A
    let titles: Vec<String> = h
        .store
        .list_entries()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.title)
        .collect();
    assert_eq!(titles, vec!["B", "A"]);
    assert_eq!(*h.inbox.fetch_offsets.lock().unwrap(), vec![0, 3]);
}

#[tokio::test]
async fn unimportable_messages_do_not_block_the_cursor() {
    let h = harness(
        ScriptedInbox {
            updates: vec![
                message(5, -12345, None, "", Some("just text")),
                message(6, -12345, Some(MediaKind::Photo), "P1", None),
                message(
                    7,
                    -12345,
                    Some(MediaKind::Document {
                        mime_type: Some("application/pdf".into()),
                    }),
                    "D1",
                    None,
                ),
                message(
                    8,
                    -12345,
                    Some(MediaKind::Document {
                        mime_type: Some("video/webm".into()),
                    }),
                    "D2",
                    None,
                ),
            ],
            files: files(&["D2"]),
            ..Default::default()
        },
        StorageMode::Download,
    );

    let report = h.engine.run_sync(SyncOptions::default(), &NoProgress).await.unwrap();
    assert_eq!(report.skipped, 3);
    assert_eq!(report.added_count, 1);
    assert_eq!(report.added[0].title, "video");
    assert_eq!(offset(&h).await, 9);
}

#[tokio::test]
async fn unavailable_file_is_skipped_and_the_pass_continues() {
    let h = harness(
        ScriptedInbox {
            updates: vec![
                video(1, -12345, "GONE", "lost"),
                video(2, -12345, "F2", "kept"),
            ],
            files: files(&["F2"]),
            ..Default::default()
        },
        StorageMode::Download,
    );

    let report = h.engine.run_sync(SyncOptions::default(), &NoProgress).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.added_count, 1);
    assert_eq!(report.added[0].title, "kept");
    // the failed message is not retried on the next pass
    assert_eq!(offset(&h).await, 3);
    assert_eq!(uploaded_files(&h), 1);
}

#[tokio::test]
async fn reference_only_mode_never_touches_the_file() {
    let h = harness(
        ScriptedInbox {
            updates: vec![video(1, 12345, "F1", "A")],
            ..Default::default()
        },
        StorageMode::ReferenceOnly,
    );

    let report = h.engine.run_sync(SyncOptions::default(), &NoProgress).await.unwrap();
    assert_eq!(report.added_count, 1);

    let entry = &h.store.list_entries().await.unwrap()[0];
    assert_eq!(entry.storage.remote_ref(), Some("F1"));
    assert_eq!(entry.storage.local_file(), None);
    assert!(entry.id.starts_with("tg_"));
    assert_eq!(entry.description, "Imported from Telegram (streaming from group)");
    assert_eq!(h.inbox.remote_file_calls.load(Ordering::SeqCst), 0);
    assert_eq!(uploaded_files(&h), 0);
}

#[tokio::test]
async fn from_beginning_replays_the_inbox() {
    let h = harness(
        ScriptedInbox {
            updates: vec![video(1, -12345, "F1", "A")],
            files: files(&["F1"]),
            ..Default::default()
        },
        StorageMode::Download,
    );

    h.engine.run_sync(SyncOptions::default(), &NoProgress).await.unwrap();
    let replay = h
        .engine
        .run_sync(SyncOptions { from_beginning: true }, &NoProgress)
        .await
        .unwrap();

    assert_eq!(replay.added_count, 1);
    let entries = h.store.list_entries().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_ne!(entries[0].id, entries[1].id);
    assert_eq!(offset(&h).await, 2);
}

#[tokio::test]
async fn failure_on_second_page_keeps_the_first() {
    let updates: Vec<RawInboxMessage> = (1..=150)
        .map(|id| video(id, -12345, "F", &format!("clip {}", id)))
        .collect();
    let h = harness(
        ScriptedInbox {
            updates,
            fail_from_offset: Some(101),
            ..Default::default()
        },
        StorageMode::ReferenceOnly,
    );

    let err = h
        .engine
        .run_sync(SyncOptions::default(), &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RemoteUnavailable(_)));

    assert_eq!(offset(&h).await, 101);
    assert_eq!(h.store.list_entries().await.unwrap().len(), 100);
    assert_eq!(*h.inbox.fetch_offsets.lock().unwrap(), vec![0, 101]);
}

#[tokio::test]
async fn pages_until_a_short_page() {
    let updates: Vec<RawInboxMessage> = (1..=5)
        .map(|id| video(id, -12345, "F", "clip"))
        .collect();
    let h = harness_with(
        ScriptedInbox {
            updates,
            ..Default::default()
        },
        Arc::new(InMemoryStore::new()),
        options(StorageMode::ReferenceOnly, 2),
    );

    let report = h.engine.run_sync(SyncOptions::default(), &NoProgress).await.unwrap();
    assert_eq!(report.added_count, 5);
    assert_eq!(report.pages, 3);
    assert_eq!(*h.inbox.fetch_offsets.lock().unwrap(), vec![0, 3, 5]);
    assert_eq!(offset(&h).await, 6);
}

#[tokio::test]
async fn missing_credential_fails_before_fetching() {
    let mut opts = options(StorageMode::Download, 100);
    opts.initial_state.bot_token = None;
    let h = harness_with(
        ScriptedInbox::default(),
        Arc::new(InMemoryStore::new()),
        opts,
    );

    let err = h
        .engine
        .run_sync(SyncOptions { from_beginning: true }, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ConfigMissing(_)));
    assert!(h.inbox.fetch_offsets.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fallback_chat_and_token_are_used_when_nothing_is_stored() {
    let mut opts = options(StorageMode::ReferenceOnly, 100);
    opts.initial_state = SyncState::new("", None, StorageMode::ReferenceOnly);
    opts.default_chat_id = Some("-777".into());
    opts.fallback_token = Some("env-token".into());
    let h = harness_with(
        ScriptedInbox {
            updates: vec![video(1, -777, "F1", "A")],
            ..Default::default()
        },
        Arc::new(InMemoryStore::new()),
        opts,
    );

    let report = h.engine.run_sync(SyncOptions::default(), &NoProgress).await.unwrap();
    assert_eq!(report.added_count, 1);
}

#[tokio::test]
async fn failed_commit_keeps_offset_and_removes_downloads() {
    let h = harness_with(
        ScriptedInbox {
            updates: vec![video(1, -12345, "F1", "A")],
            files: files(&["F1"]),
            ..Default::default()
        },
        Arc::new(FailingCommitStore {
            inner: InMemoryStore::new(),
        }),
        options(StorageMode::Download, 100),
    );

    let err = h
        .engine
        .run_sync(SyncOptions::default(), &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::PersistenceError(_)));
    assert_eq!(offset(&h).await, 0);
    assert!(h.store.list_entries().await.unwrap().is_empty());
    assert_eq!(uploaded_files(&h), 0);
}

#[tokio::test]
async fn concurrent_pass_is_rejected() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let h = harness(
        ScriptedInbox {
            updates: vec![video(1, -12345, "F1", "A")],
            gate: Some((entered.clone(), release.clone())),
            ..Default::default()
        },
        StorageMode::ReferenceOnly,
    );

    let engine = h.engine.clone();
    let first = tokio::spawn(async move {
        engine.run_sync(SyncOptions::default(), &NoProgress).await
    });
    entered.notified().await;

    let err = h
        .engine
        .run_sync(SyncOptions::default(), &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SyncInProgress));

    release.notify_one();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.added_count, 1);
    assert_eq!(h.store.list_entries().await.unwrap().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
// Push and inspect
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn pushed_video_is_imported_and_advances_cursor() {
    let h = harness(
        ScriptedInbox {
            files: files(&["F9"]),
            ..Default::default()
        },
        StorageMode::Download,
    );

    let outcome = h.engine.handle_push(video(41, -12345, "F9", "pushed")).await.unwrap();
    let added = match outcome {
        PushOutcome::Imported(added) => added,
        other => panic!("expected import, got {:?}", other),
    };
    assert_eq!(added.title, "pushed");

    let entry = &h.store.list_entries().await.unwrap()[0];
    assert_eq!(entry.description, "Imported from Telegram (auto)");
    assert_eq!(offset(&h).await, 42);

    let skipped = h.engine.handle_push(video(42, 555, "F9", "elsewhere")).await.unwrap();
    assert!(matches!(skipped, PushOutcome::Skipped(_)));
    assert_eq!(offset(&h).await, 43);
    assert_eq!(h.store.list_entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn inspect_counts_per_chat_without_touching_state() {
    let h = harness(
        ScriptedInbox {
            updates: vec![
                video(1, -100, "F1", "a"),
                message(2, -100, None, "", Some("hi")),
                video(3, -200, "F2", "b"),
                RawInboxMessage {
                    update_id: 4,
                    chat: None,
                    caption: None,
                    media: None,
                },
            ],
            ..Default::default()
        },
        StorageMode::Download,
    );

    let report = h.engine.inspect_inbox().await.unwrap();
    assert_eq!(report.total_updates, 4);
    assert_eq!(report.chats.len(), 2);
    assert_eq!(report.chats[0].chat_id, -100);
    assert_eq!(report.chats[0].message_count, 2);
    assert_eq!(report.chats[0].media_count, 1);
    assert_eq!(report.chats[1].chat_id, -200);
    assert_eq!(report.chats[1].media_count, 1);

    assert!(h.store.load_state().await.unwrap().is_none());
    assert!(h.store.list_entries().await.unwrap().is_empty());
}
