//! Seams between the sync engine and the outside world.
//!
//! The engine never talks to the network or the filesystem directly. It goes
//! through [`InboxClient`] for the remote bot inbox and [`MediaStorage`] for
//! downloaded bytes, so alternative transports (or scripted fakes in tests)
//! plug in without touching the pipeline.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ InboxClient  │───▶│  SyncEngine  │───▶│ MediaStorage │
//! │ (Bot API)    │    │ classify →   │    │ (uploads/)   │
//! └──────────────┘    │ build → save │    └──────────────┘
//!                     └──────┬───────┘
//!                            ▼
//!                        Store (SQLite)
//! ```

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::models::InboxPage;

// ═══════════════════════════════════════════════════════════════════════
// InboxClient
// ═══════════════════════════════════════════════════════════════════════

/// Thin request/response wrapper around the remote messaging API.
///
/// Implementations perform exactly one remote call per method and never
/// retry. Retry policy belongs to the caller.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use inbox_harvest::error::{SyncError, SyncResult};
/// use inbox_harvest::models::InboxPage;
/// use inbox_harvest::traits::InboxClient;
///
/// struct EmptyInbox;
///
/// #[async_trait]
/// impl InboxClient for EmptyInbox {
///     async fn fetch_pending(&self, _token: &str, _offset: i64, _limit: u32) -> SyncResult<InboxPage> {
///         Ok(InboxPage::default())
///     }
///     async fn resolve_file_location(&self, _token: &str, file_ref: &str) -> SyncResult<String> {
///         Err(SyncError::FileUnavailable(file_ref.to_string()))
///     }
///     async fn download_bytes(&self, _token: &str, location: &str) -> SyncResult<Vec<u8>> {
///         Err(SyncError::TransferError(location.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait InboxClient: Send + Sync {
    /// Fetch up to `limit` updates with identifiers `>= offset`.
    ///
    /// Fails with `RemoteUnavailable` on transport error or when the API
    /// answers with a non-success response.
    async fn fetch_pending(&self, token: &str, offset: i64, limit: u32) -> SyncResult<InboxPage>;

    /// Turn a file reference into a downloadable location (a remote path).
    ///
    /// Fails with `FileUnavailable` when the reference expired or was deleted.
    async fn resolve_file_location(&self, token: &str, file_ref: &str) -> SyncResult<String>;

    /// Download the bytes at a location returned by
    /// [`resolve_file_location`](InboxClient::resolve_file_location).
    ///
    /// Fails with `TransferError` on truncated or non-200 transfers.
    async fn download_bytes(&self, token: &str, location: &str) -> SyncResult<Vec<u8>>;
}

// ═══════════════════════════════════════════════════════════════════════
// MediaStorage
// ═══════════════════════════════════════════════════════════════════════

/// Local file storage for downloaded media.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Write `bytes` under a freshly generated, unique filename ending in
    /// `extension` (including the leading dot). Returns the filename.
    async fn write_unique(&self, bytes: &[u8], extension: &str) -> SyncResult<String>;

    /// Remove a previously written file. Missing files are not an error.
    async fn delete(&self, filename: &str) -> SyncResult<()>;
}
