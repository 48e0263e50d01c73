//! Local media storage.
//!
//! Files land in `[storage].uploads_dir` as `<unix-millis>_<random>.<ext>`.
//! The millisecond timestamp keeps listings roughly chronological and the
//! random suffix makes names unique within the same millisecond, so the
//! filename stem doubles as a catalog identifier.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::traits::MediaStorage;

/// Fallback extension when the remote path carries none.
pub const DEFAULT_EXTENSION: &str = ".mp4";

/// [`MediaStorage`] backed by a local directory.
pub struct LocalMediaStorage {
    root: PathBuf,
}

impl LocalMediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}

/// Generate a unique filename: time-based prefix plus random suffix.
pub fn generate_filename(extension: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}{}", millis, &suffix[..8], normalize_extension(extension))
}

/// Extension (with leading dot) of a remote path, or [`DEFAULT_EXTENSION`].
pub fn extension_of(remote_path: &str) -> String {
    Path::new(remote_path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Filename minus its extension.
pub fn stem_of(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

fn normalize_extension(extension: &str) -> String {
    let ext = extension.trim();
    if ext.is_empty() {
        DEFAULT_EXTENSION.to_string()
    } else if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

/// Write `bytes` to the freshly created file at `path`. On failure the
/// partial file is removed so a full disk leaves nothing behind.
async fn fill_or_remove<W>(path: &Path, mut out: W, bytes: &[u8]) -> SyncResult<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match out.write_all(bytes).await {
        Ok(()) => out.flush().await,
        Err(e) => Err(e),
    };
    drop(out);

    if let Err(e) = written {
        if let Err(rm) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %rm, "could not remove partial file");
        }
        return Err(SyncError::PersistenceError(format!(
            "cannot write {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn write_unique(&self, bytes: &[u8], extension: &str) -> SyncResult<String> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            SyncError::PersistenceError(format!(
                "cannot create uploads dir {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let filename = generate_filename(extension);
        let path = self.path_of(&filename);

        // create_new: never clobber an existing file
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                SyncError::PersistenceError(format!("cannot create {}: {}", path.display(), e))
            })?;

        fill_or_remove(&path, file, bytes).await?;
        Ok(filename)
    }

    async fn delete(&self, filename: &str) -> SyncResult<()> {
        match tokio::fs::remove_file(self.path_of(filename)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
