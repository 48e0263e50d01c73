//! Message classification.
//!
//! Decides whether a raw inbox message is an importable video and, if so,
//! reduces it to a [`MediaDescriptor`]. Pure: no I/O, no clock.

use std::fmt;

use crate::models::{MediaDescriptor, MediaKind, RawInboxMessage};

/// Longest title kept, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Title used when a message has neither caption nor filename.
pub const FALLBACK_TITLE: &str = "video";

/// Why a message was not imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    WrongChat,
    NoMediaPayload,
    UnsupportedMediaKind,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::WrongChat => "wrong chat",
            SkipReason::NoMediaPayload => "no media payload",
            SkipReason::UnsupportedMediaKind => "unsupported media kind",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Accept(MediaDescriptor),
    Skip(SkipReason),
}

/// A chat filter, normalized so that signed and unsigned spellings of the
/// same chat (`12345`, `-12345`) compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatFilter(u64);

impl ChatFilter {
    /// Parse a configured chat id. Returns `None` for empty or non-numeric input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<u64>().ok().map(ChatFilter)
    }

    pub fn matches(&self, chat_id: i64) -> bool {
        chat_id.unsigned_abs() == self.0
    }
}

/// Classify `msg` against the target chat.
pub fn classify(msg: &RawInboxMessage, target: &ChatFilter) -> Classification {
    let chat = match &msg.chat {
        Some(chat) if target.matches(chat.id) => chat,
        _ => return Classification::Skip(SkipReason::WrongChat),
    };

    let media = match &msg.media {
        Some(media) => media,
        None => return Classification::Skip(SkipReason::NoMediaPayload),
    };

    if !media.kind.is_video() {
        return Classification::Skip(SkipReason::UnsupportedMediaKind);
    }

    let document_name = match media.kind {
        MediaKind::Document { .. } => media.file_name.as_deref(),
        _ => None,
    };

    Classification::Accept(MediaDescriptor {
        update_id: msg.update_id,
        chat_id: chat.id,
        file_ref: media.file_ref.clone(),
        title: derive_title(msg.caption.as_deref(), document_name),
    })
}

/// Caption, else document filename, else [`FALLBACK_TITLE`]; blank values
/// count as absent. Truncated to [`MAX_TITLE_CHARS`] characters.
pub fn derive_title(caption: Option<&str>, file_name: Option<&str>) -> String {
    fn non_blank(s: Option<&str>) -> Option<&str> {
        s.map(str::trim).filter(|s| !s.is_empty())
    }
    let title = non_blank(caption)
        .or_else(|| non_blank(file_name))
        .unwrap_or(FALLBACK_TITLE);
    title.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string()
}
