//! Telegram Bot API inbox client.
//!
//! Implements [`InboxClient`] on top of three Bot API calls:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | fetch pending updates | `GET /bot<token>/getUpdates?offset=&limit=&timeout=0` |
//! | resolve file location | `GET /bot<token>/getFile?file_id=` |
//! | download bytes | `GET /file/bot<token>/<file_path>` |
//!
//! Webhook registration (`setWebhook` / `deleteWebhook`) lives here too, as
//! inherent methods used by the admin commands.
//!
//! The bot token is part of every URL, so transport errors are stripped of
//! their URL before they are turned into messages.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::models::{ChatRef, InboxPage, MediaKind, MediaPayload, RawInboxMessage};
use crate::traits::InboxClient;

// ═══════════════════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════════════════

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// A Bot API `Update`. Only the containers that can carry media are read.
#[derive(Debug, Clone, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub channel_post: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub chat: TgChat,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub video: Option<TgFile>,
    #[serde(default)]
    pub video_note: Option<TgFile>,
    #[serde(default)]
    pub document: Option<TgFile>,
    #[serde(default)]
    pub animation: Option<TgFile>,
    #[serde(default)]
    pub audio: Option<TgFile>,
    #[serde(default)]
    pub voice: Option<TgFile>,
    #[serde(default)]
    pub photo: Option<Vec<TgFile>>,
    #[serde(default)]
    pub sticker: Option<TgFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

/// Common shape of video, document, audio, voice, sticker and photo sizes.
#[derive(Debug, Clone, Deserialize)]
pub struct TgFile {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgFileInfo {
    #[serde(default)]
    file_path: Option<String>,
}

impl From<TgUpdate> for RawInboxMessage {
    fn from(update: TgUpdate) -> Self {
        let msg = update.message.or(update.channel_post);
        match msg {
            None => RawInboxMessage {
                update_id: update.update_id,
                chat: None,
                caption: None,
                media: None,
            },
            Some(msg) => {
                let chat = ChatRef {
                    id: msg.chat.id,
                    title: msg.chat.title.clone().or_else(|| msg.chat.first_name.clone()),
                };
                let caption = msg.caption.clone();
                RawInboxMessage {
                    update_id: update.update_id,
                    chat: Some(chat),
                    caption,
                    media: media_of(msg),
                }
            }
        }
    }
}

/// Pick the attached media, most specific first.
///
/// Telegram sets `document` alongside `animation` for GIF posts, so document
/// is checked first and its mime type decides acceptance. Only documents keep
/// their filename.
fn media_of(msg: TgMessage) -> Option<MediaPayload> {
    let payload = |kind: MediaKind, f: TgFile| MediaPayload {
        kind,
        file_ref: f.file_id,
        file_name: None,
    };

    if let Some(f) = msg.video {
        return Some(payload(MediaKind::Video, f));
    }
    if let Some(f) = msg.video_note {
        return Some(payload(MediaKind::VideoNote, f));
    }
    if let Some(f) = msg.document {
        return Some(MediaPayload {
            kind: MediaKind::Document {
                mime_type: f.mime_type,
            },
            file_ref: f.file_id,
            file_name: f.file_name,
        });
    }
    if let Some(f) = msg.animation {
        return Some(payload(MediaKind::Animation, f));
    }
    if let Some(f) = msg.audio {
        return Some(payload(MediaKind::Audio, f));
    }
    if let Some(f) = msg.voice {
        return Some(payload(MediaKind::Voice, f));
    }
    if let Some(f) = msg.photo.and_then(|sizes| sizes.into_iter().last()) {
        return Some(payload(MediaKind::Photo, f));
    }
    if let Some(f) = msg.sticker {
        return Some(payload(MediaKind::Sticker, f));
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════
// Client
// ═══════════════════════════════════════════════════════════════════════

/// [`InboxClient`] speaking the Telegram Bot API over HTTPS.
pub struct TelegramClient {
    api_base: String,
    http: reqwest::Client,
}

impl TelegramClient {
    /// Create a client for `api_base` (e.g. `https://api.telegram.org`).
    /// `timeout` bounds every request, including downloads.
    pub fn new(api_base: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, token, method)
    }

    fn file_url(&self, token: &str, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.api_base,
            token,
            file_path.trim_start_matches('/')
        )
    }

    /// Call a Bot API method and unwrap its envelope.
    ///
    /// `Err` carries a transport or decoding failure; `Refused` carries the
    /// API's own description of why it said no.
    async fn call<T: DeserializeOwned>(
        &self,
        token: &str,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<ApiOutcome<T>, String> {
        let resp = self
            .http
            .get(self.method_url(token, method))
            .query(query)
            .send()
            .await
            .map_err(redact)?;

        let status = resp.status();
        let text = resp.text().await.map_err(redact)?;
        let envelope: ApiResponse<T> = serde_json::from_str(&text)
            .map_err(|e| format!("{} returned HTTP {} with unreadable body: {}", method, status, e))?;

        if envelope.ok {
            Ok(ApiOutcome::Ok(envelope.result))
        } else {
            Ok(ApiOutcome::Refused(envelope.description.unwrap_or_else(|| {
                format!("{} failed with HTTP {}", method, status)
            })))
        }
    }

    /// Register `url` as the push endpoint for this bot.
    pub async fn set_webhook(
        &self,
        token: &str,
        url: &str,
        secret_token: Option<&str>,
    ) -> SyncResult<()> {
        let mut query = vec![("url", url.to_string())];
        if let Some(secret) = secret_token {
            query.push(("secret_token", secret.to_string()));
        }
        match self.call::<serde_json::Value>(token, "setWebhook", &query).await {
            Ok(ApiOutcome::Ok(_)) => Ok(()),
            Ok(ApiOutcome::Refused(desc)) => Err(SyncError::RemoteUnavailable(desc)),
            Err(e) => Err(SyncError::RemoteUnavailable(e)),
        }
    }

    /// Remove the push endpoint; pull sync works again afterwards.
    pub async fn delete_webhook(&self, token: &str) -> SyncResult<()> {
        match self.call::<serde_json::Value>(token, "deleteWebhook", &[]).await {
            Ok(ApiOutcome::Ok(_)) => Ok(()),
            Ok(ApiOutcome::Refused(desc)) => Err(SyncError::RemoteUnavailable(desc)),
            Err(e) => Err(SyncError::RemoteUnavailable(e)),
        }
    }
}

enum ApiOutcome<T> {
    Ok(Option<T>),
    Refused(String),
}

fn redact(e: reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.without_url().to_string()
    }
}

#[async_trait]
impl InboxClient for TelegramClient {
    async fn fetch_pending(&self, token: &str, offset: i64, limit: u32) -> SyncResult<InboxPage> {
        let query = [
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
            ("timeout", "0".to_string()),
        ];
        let updates: Vec<TgUpdate> = match self.call(token, "getUpdates", &query).await {
            Ok(ApiOutcome::Ok(result)) => result.unwrap_or_default(),
            Ok(ApiOutcome::Refused(desc)) => return Err(SyncError::RemoteUnavailable(desc)),
            Err(e) => return Err(SyncError::RemoteUnavailable(e)),
        };

        let next_offset = updates.iter().map(|u| u.update_id + 1).max();
        Ok(InboxPage {
            updates: updates.into_iter().map(RawInboxMessage::from).collect(),
            next_offset,
        })
    }

    async fn resolve_file_location(&self, token: &str, file_ref: &str) -> SyncResult<String> {
        let query = [("file_id", file_ref.to_string())];
        match self.call::<TgFileInfo>(token, "getFile", &query).await {
            Ok(ApiOutcome::Ok(Some(TgFileInfo {
                file_path: Some(path),
            }))) if !path.is_empty() => Ok(path),
            Ok(ApiOutcome::Ok(_)) => Err(SyncError::FileUnavailable(format!(
                "no file path for {}",
                file_ref
            ))),
            Ok(ApiOutcome::Refused(desc)) => Err(SyncError::FileUnavailable(desc)),
            Err(e) => Err(SyncError::TransferError(format!("getFile: {}", e))),
        }
    }

    async fn download_bytes(&self, token: &str, location: &str) -> SyncResult<Vec<u8>> {
        let resp = self
            .http
            .get(self.file_url(token, location))
            .send()
            .await
            .map_err(|e| SyncError::TransferError(redact(e)))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(SyncError::TransferError(format!(
                "download of {} returned HTTP {}",
                location, status
            )));
        }

        let expected = resp.content_length();
        let body = resp
            .bytes()
            .await
            .map_err(|e| SyncError::TransferError(redact(e)))?;

        if let Some(len) = expected {
            if body.len() as u64 != len {
                return Err(SyncError::TransferError(format!(
                    "download of {} truncated: {} of {} bytes",
                    location,
                    body.len(),
                    len
                )));
            }
        }

        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: serde_json::Value) -> RawInboxMessage {
        let u: TgUpdate = serde_json::from_value(json).unwrap();
        u.into()
    }

    #[test]
    fn converts_video_message() {
        let raw = update(serde_json::json!({
            "update_id": 7,
            "message": {
                "message_id": 1,
                "date": 0,
                "chat": { "id": -12345, "type": "supergroup", "title": "Clips" },
                "caption": "A",
                "video": { "file_id": "F1", "file_unique_id": "u", "width": 1, "height": 1, "duration": 3 }
            }
        }));
        assert_eq!(raw.update_id, 7);
        assert_eq!(raw.chat.as_ref().unwrap().id, -12345);
        assert_eq!(raw.chat.as_ref().unwrap().title.as_deref(), Some("Clips"));
        assert_eq!(raw.caption.as_deref(), Some("A"));
        let media = raw.media.unwrap();
        assert_eq!(media.kind, MediaKind::Video);
        assert_eq!(media.file_ref, "F1");
    }

    #[test]
    fn converts_channel_post_document() {
        let raw = update(serde_json::json!({
            "update_id": 8,
            "channel_post": {
                "chat": { "id": -100, "type": "channel" },
                "document": { "file_id": "D1", "file_name": "clip.mkv", "mime_type": "video/x-matroska" }
            }
        }));
        let media = raw.media.unwrap();
        assert_eq!(
            media.kind,
            MediaKind::Document {
                mime_type: Some("video/x-matroska".into())
            }
        );
        assert_eq!(media.file_name.as_deref(), Some("clip.mkv"));
    }

    #[test]
    fn gif_post_is_read_as_its_video_document() {
        let raw = update(serde_json::json!({
            "update_id": 9,
            "message": {
                "chat": { "id": 1, "type": "private", "first_name": "Ann" },
                "animation": { "file_id": "A1", "mime_type": "video/mp4" },
                "document": { "file_id": "A1", "mime_type": "video/mp4" }
            }
        }));
        assert_eq!(raw.chat.as_ref().unwrap().title.as_deref(), Some("Ann"));
        let media = raw.media.clone().unwrap();
        assert_eq!(
            media.kind,
            MediaKind::Document {
                mime_type: Some("video/mp4".into())
            }
        );
        assert!(media.kind.is_video());

        let filter = crate::classify::ChatFilter::parse("1").unwrap();
        assert!(matches!(
            crate::classify::classify(&raw, &filter),
            crate::classify::Classification::Accept(_)
        ));
    }

    #[test]
    fn bare_animation_is_not_a_video() {
        let raw = update(serde_json::json!({
            "update_id": 12,
            "message": {
                "chat": { "id": 1, "type": "private" },
                "animation": { "file_id": "A2", "mime_type": "video/mp4" }
            }
        }));
        assert_eq!(raw.media.unwrap().kind, MediaKind::Animation);
    }

    #[test]
    fn video_filename_is_not_kept() {
        let raw = update(serde_json::json!({
            "update_id": 13,
            "message": {
                "chat": { "id": 1, "type": "private" },
                "video": { "file_id": "V1", "file_name": "clip.mp4", "mime_type": "video/mp4" }
            }
        }));
        assert!(raw.media.as_ref().unwrap().file_name.is_none());

        let filter = crate::classify::ChatFilter::parse("1").unwrap();
        match crate::classify::classify(&raw, &filter) {
            crate::classify::Classification::Accept(d) => assert_eq!(d.title, "video"),
            other => panic!("expected accept, got {:?}", other),
        }
    }

    #[test]
    fn update_without_message_has_no_chat() {
        let raw = update(serde_json::json!({
            "update_id": 10,
            "edited_message": { "chat": { "id": 1, "type": "private" } }
        }));
        assert!(raw.chat.is_none());
        assert!(raw.media.is_none());
    }

    #[test]
    fn largest_photo_size_is_used() {
        let raw = update(serde_json::json!({
            "update_id": 11,
            "message": {
                "chat": { "id": 1, "type": "private" },
                "photo": [ { "file_id": "small" }, { "file_id": "large" } ]
            }
        }));
        let media = raw.media.unwrap();
        assert_eq!(media.kind, MediaKind::Photo);
        assert_eq!(media.file_ref, "large");
    }
}
