//! Core data models used throughout the harvester.
//!
//! These types represent the inbox messages that flow in from the remote
//! bot API, the descriptors the classifier produces from them, and the
//! catalog entries and sync state that are persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a catalog entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryOrigin {
    LocalUpload,
    RemoteImport,
}

impl EntryOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryOrigin::LocalUpload => "local-upload",
            EntryOrigin::RemoteImport => "remote-import",
        }
    }
}

impl FromStr for EntryOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local-upload" => Ok(EntryOrigin::LocalUpload),
            "remote-import" => Ok(EntryOrigin::RemoteImport),
            other => Err(format!("unknown entry origin: '{}'", other)),
        }
    }
}

/// How an entry's media bytes are reachable. Exactly one variant is ever
/// set, so an entry can never carry both or neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageDescriptor {
    LocalFile { filename: String },
    RemoteRef { file_ref: String },
}

impl StorageDescriptor {
    pub fn local_file(&self) -> Option<&str> {
        match self {
            StorageDescriptor::LocalFile { filename } => Some(filename),
            StorageDescriptor::RemoteRef { .. } => None,
        }
    }

    pub fn remote_ref(&self) -> Option<&str> {
        match self {
            StorageDescriptor::LocalFile { .. } => None,
            StorageDescriptor::RemoteRef { file_ref } => Some(file_ref),
        }
    }

    /// Rebuild a descriptor from the two nullable columns it is stored in.
    pub fn from_columns(local_file: Option<String>, remote_ref: Option<String>) -> Option<Self> {
        match (local_file, remote_ref) {
            (Some(filename), None) => Some(StorageDescriptor::LocalFile { filename }),
            (None, Some(file_ref)) => Some(StorageDescriptor::RemoteRef { file_ref }),
            _ => None,
        }
    }
}

/// The profile an imported entry is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub name: String,
}

/// A media item in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    pub origin: EntryOrigin,
    pub storage: StorageDescriptor,
    pub owner_id: String,
    pub owner_name: String,
    pub views: i64,
    pub likes: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Storage-mode policy for imported media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    /// Copy bytes into local storage.
    Download,
    /// Keep only the remote file reference.
    ReferenceOnly,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Download => "download",
            StorageMode::ReferenceOnly => "reference-only",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "download" => Ok(StorageMode::Download),
            // `telegram_only` is what older data files call reference-only.
            "reference-only" | "reference_only" | "telegram_only" => Ok(StorageMode::ReferenceOnly),
            other => Err(format!(
                "unknown storage mode: '{}'. Must be download or reference-only.",
                other
            )),
        }
    }
}

/// Persistent sync configuration and cursor.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Chat filter; empty means "not configured".
    pub chat_id: String,
    pub bot_token: Option<String>,
    /// Next update identifier to request; 0 replays from the beginning.
    pub offset: i64,
    pub mode: StorageMode,
}

impl SyncState {
    pub fn new(chat_id: impl Into<String>, bot_token: Option<String>, mode: StorageMode) -> Self {
        Self {
            chat_id: chat_id.into(),
            bot_token,
            offset: 0,
            mode,
        }
    }
}

impl fmt::Debug for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncState")
            .field("chat_id", &self.chat_id)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "***"))
            .field("offset", &self.offset)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Chat a message was posted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRef {
    pub id: i64,
    /// Group title, or first name for private chats.
    pub title: Option<String>,
}

/// Kind of media attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    VideoNote,
    Document { mime_type: Option<String> },
    Animation,
    Audio,
    Voice,
    Photo,
    Sticker,
}

impl MediaKind {
    /// True for media the catalog can import.
    pub fn is_video(&self) -> bool {
        match self {
            MediaKind::Video | MediaKind::VideoNote => true,
            MediaKind::Document { mime_type } => mime_type
                .as_deref()
                .map(|m| m.trim().to_ascii_lowercase().starts_with("video/"))
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Media attached to an inbox message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub kind: MediaKind,
    pub file_ref: String,
    /// Original filename; only documents carry one.
    pub file_name: Option<String>,
}

/// A transient update pulled from, or pushed by, the remote inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInboxMessage {
    /// Strictly increasing per inbox; defines cursor order.
    pub update_id: i64,
    /// `None` when the update carries no chat message at all.
    pub chat: Option<ChatRef>,
    pub caption: Option<String>,
    pub media: Option<MediaPayload>,
}

/// One page of pending updates.
#[derive(Debug, Clone, Default)]
pub struct InboxPage {
    pub updates: Vec<RawInboxMessage>,
    /// Offset that would acknowledge every update in this page.
    pub next_offset: Option<i64>,
}

/// Normalized representation of an importable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub update_id: i64,
    pub chat_id: i64,
    pub file_ref: String,
    pub title: String,
}

/// Identifier and title of an entry added by a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedEntry {
    pub id: String,
    pub title: String,
}

/// Outcome of a pull pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub added_count: usize,
    pub added: Vec<AddedEntry>,
    pub updates_seen: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pages: usize,
    pub offset: i64,
}

/// Per-chat counts from an inbox inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSummary {
    pub chat_id: i64,
    pub title: String,
    pub message_count: usize,
    pub media_count: usize,
}

/// Result of [`crate::sync::SyncEngine::inspect_inbox`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct InboxReport {
    pub total_updates: usize,
    pub chats: Vec<ChatSummary>,
}
