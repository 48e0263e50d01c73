//! Catalog entry construction.
//!
//! Turns an accepted [`MediaDescriptor`] into exactly one [`CatalogEntry`]
//! under the active [`StorageMode`]:
//!
//! - `download`: resolve the file location, download the bytes, write them
//!   under a fresh unique filename. The entry id is that filename's stem.
//! - `reference-only`: keep the remote file reference. No transfer happens;
//!   the id is synthesized as `tg_<millis>_<random>`.
//!
//! The builder does not persist the entry; the sync driver commits it with
//! the cursor. A downloaded file whose entry never gets committed is removed
//! again by the driver.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::media_store::{extension_of, stem_of};
use crate::models::{CatalogEntry, EntryOrigin, MediaDescriptor, Owner, StorageDescriptor, StorageMode};
use crate::store::Store;
use crate::traits::{InboxClient, MediaStorage};

/// Prefix of identifiers synthesized for reference-only entries.
pub const REMOTE_ID_PREFIX: &str = "tg_";

const ID_ATTEMPTS: usize = 3;

/// How the message reached us; only affects the entry description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPath {
    Pull,
    Push,
}

/// Collaborators and credentials for one build.
pub struct EntryBuilder<'a> {
    pub inbox: &'a dyn InboxClient,
    pub storage: &'a dyn MediaStorage,
    pub store: &'a dyn Store,
    pub owner: &'a Owner,
    pub token: &'a str,
}

impl EntryBuilder<'_> {
    pub async fn build(
        &self,
        descriptor: &MediaDescriptor,
        mode: StorageMode,
        path: ImportPath,
    ) -> SyncResult<CatalogEntry> {
        let (id, storage) = match mode {
            StorageMode::Download => {
                let filename = self.download(descriptor).await?;
                (stem_of(&filename), StorageDescriptor::LocalFile { filename })
            }
            StorageMode::ReferenceOnly => (
                self.synthesize_id().await?,
                StorageDescriptor::RemoteRef {
                    file_ref: descriptor.file_ref.clone(),
                },
            ),
        };

        Ok(CatalogEntry {
            id,
            title: descriptor.title.clone(),
            origin: EntryOrigin::RemoteImport,
            storage,
            owner_id: self.owner.id.clone(),
            owner_name: self.owner.name.clone(),
            views: 0,
            likes: 0,
            description: description_for(mode, path).to_string(),
            created_at: Utc::now(),
        })
    }

    async fn download(&self, descriptor: &MediaDescriptor) -> SyncResult<String> {
        let location = self
            .inbox
            .resolve_file_location(self.token, &descriptor.file_ref)
            .await?;
        let bytes = self.inbox.download_bytes(self.token, &location).await?;
        let filename = self
            .storage
            .write_unique(&bytes, &extension_of(&location))
            .await?;
        debug!(
            update_id = descriptor.update_id,
            filename = %filename,
            bytes = bytes.len(),
            "media downloaded"
        );
        Ok(filename)
    }

    async fn synthesize_id(&self) -> SyncResult<String> {
        for _ in 0..ID_ATTEMPTS {
            let id = remote_entry_id();
            if !self.store.entry_exists(&id).await? {
                return Ok(id);
            }
        }
        Err(SyncError::PersistenceError(
            "could not generate a unique entry id".to_string(),
        ))
    }
}

/// `tg_<unix-millis>_<7 random chars>`.
pub fn remote_entry_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}_{}",
        REMOTE_ID_PREFIX,
        Utc::now().timestamp_millis(),
        &suffix[..7]
    )
}

fn description_for(mode: StorageMode, path: ImportPath) -> &'static str {
    match (path, mode) {
        (ImportPath::Push, _) => "Imported from Telegram (auto)",
        (ImportPath::Pull, StorageMode::Download) => "Imported from Telegram",
        (ImportPath::Pull, StorageMode::ReferenceOnly) => {
            "Imported from Telegram (streaming from group)"
        }
    }
}
