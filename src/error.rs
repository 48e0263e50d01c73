//! Error taxonomy for the sync core.
//!
//! Per-message errors (`FileUnavailable`, `TransferError`, and a local write
//! `PersistenceError`) skip one message and let the pass continue. Everything
//! else aborts the pass and is surfaced to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// No credential or chat filter is configured.
    #[error("configuration missing: {0}")]
    ConfigMissing(String),

    /// Transport failure or non-success API response while talking to the inbox.
    #[error("remote inbox unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote no longer serves the file reference.
    #[error("remote file unavailable: {0}")]
    FileUnavailable(String),

    /// Truncated or non-200 byte transfer.
    #[error("transfer failed: {0}")]
    TransferError(String),

    /// Local write failure (media file, catalog, or cursor).
    #[error("persistence failed: {0}")]
    PersistenceError(String),

    /// Another pass already holds the sync lock.
    #[error("a sync pass is already running")]
    SyncInProgress,
}

impl SyncError {
    /// True when the error only affects the message being imported.
    pub fn is_per_message(&self) -> bool {
        matches!(
            self,
            SyncError::FileUnavailable(_)
                | SyncError::TransferError(_)
                | SyncError::PersistenceError(_)
        )
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::ConfigMissing(_) => "config_missing",
            SyncError::RemoteUnavailable(_) => "remote_unavailable",
            SyncError::FileUnavailable(_) => "file_unavailable",
            SyncError::TransferError(_) => "transfer_error",
            SyncError::PersistenceError(_) => "persistence_error",
            SyncError::SyncInProgress => "sync_in_progress",
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::PersistenceError(e.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::PersistenceError(e.to_string())
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
