//! Operator settings: credential, chat filter, storage mode, webhook.
//!
//! Settings live in the same sync state row as the cursor. Updates only
//! touch the fields that were supplied; the cursor is never moved here
//! except by [`reset_cursor`].

use serde::Serialize;
use tracing::info;

use crate::classify::ChatFilter;
use crate::cursor::SyncCursor;
use crate::error::{SyncError, SyncResult};
use crate::inbox_telegram::TelegramClient;
use crate::models::{StorageMode, SyncState};
use crate::store::Store;
use std::sync::Arc;

/// Placeholder a settings form sends back when the token was not edited.
pub const MASKED_TOKEN: &str = "***";

/// Path the push endpoint is mounted at.
pub const WEBHOOK_PATH: &str = "/webhook";

/// Partial update of the sync settings. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub mode: Option<StorageMode>,
}

/// Settings as shown to an operator; the token is never echoed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SettingsView {
    pub chat_id: String,
    pub bot_token: Option<String>,
    pub mode: StorageMode,
    pub offset: i64,
}

impl From<&SyncState> for SettingsView {
    fn from(state: &SyncState) -> Self {
        Self {
            chat_id: state.chat_id.clone(),
            bot_token: state.bot_token.as_ref().map(|_| MASKED_TOKEN.to_string()),
            mode: state.mode,
            offset: state.offset,
        }
    }
}

/// Apply `update` on top of the stored settings (or `defaults` when nothing
/// is stored yet) and persist the result.
///
/// A token of `""` or `"***"` is ignored so a form round-trip cannot wipe the
/// stored credential. A chat id must be numeric, optionally with a leading
/// `-`; an empty one clears the filter.
pub async fn configure(
    store: Arc<dyn Store>,
    defaults: SyncState,
    update: SettingsUpdate,
) -> SyncResult<SettingsView> {
    let cursor = SyncCursor::load(store.clone(), defaults).await?;
    let mut state = cursor.state().clone();

    if let Some(token) = update.bot_token {
        let token = token.trim();
        if !token.is_empty() && token != MASKED_TOKEN {
            state.bot_token = Some(token.to_string());
        }
    }
    if let Some(chat_id) = update.chat_id {
        let chat_id = chat_id.trim();
        if !chat_id.is_empty() && ChatFilter::parse(chat_id).is_none() {
            return Err(SyncError::ConfigMissing(format!(
                "chat id '{}' is not numeric",
                chat_id
            )));
        }
        state.chat_id = chat_id.to_string();
    }
    if let Some(mode) = update.mode {
        state.mode = mode;
    }

    store.save_state(&state).await?;
    info!(chat_id = %state.chat_id, mode = %state.mode, "settings saved");
    Ok(SettingsView::from(&state))
}

/// Current settings, without creating state when none exists.
pub async fn current_settings(store: &dyn Store, defaults: SyncState) -> SyncResult<SettingsView> {
    let state = store.load_state().await?.unwrap_or(defaults);
    Ok(SettingsView::from(&state))
}

/// Rewind the cursor to 0 so the next pass replays the whole inbox.
pub async fn reset_cursor(store: Arc<dyn Store>, defaults: SyncState) -> SyncResult<()> {
    let mut cursor = SyncCursor::load(store, defaults).await?;
    cursor.reset_to_beginning().await?;
    info!("sync cursor reset to 0");
    Ok(())
}

/// Full push endpoint URL for a public base URL.
pub fn webhook_url(public_base: &str) -> String {
    format!("{}{}", public_base.trim_end_matches('/'), WEBHOOK_PATH)
}

/// Point the remote inbox at our push endpoint. Returns the registered URL.
///
/// While a webhook is registered the remote refuses pull requests.
pub async fn enable_webhook(
    client: &TelegramClient,
    token: &str,
    public_base: &str,
    secret: Option<&str>,
) -> SyncResult<String> {
    let url = webhook_url(public_base);
    client.set_webhook(token, &url, secret).await?;
    info!(url = %url, "webhook registered");
    Ok(url)
}

pub async fn disable_webhook(client: &TelegramClient, token: &str) -> SyncResult<()> {
    client.delete_webhook(token).await?;
    info!("webhook removed");
    Ok(())
}
