//! Domain models for the exported archive layout.
//!
//! Chunk files carry a flat message shape with an `is_service` flag. It is
//! turned into the tagged [`Message`] enum once, at deserialization, so no
//! later stage has to guess what kind of message it is looking at.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the global chat list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSummary {
    pub chat_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// `data/manifest.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalManifest {
    #[serde(default)]
    pub chats: Vec<ChatSummary>,
    #[serde(default)]
    pub total_chats: Option<u64>,
    #[serde(default)]
    pub total_messages: Option<u64>,
    #[serde(default)]
    pub generated_at: Option<String>,
}

impl GlobalManifest {
    /// Chats whose title contains `query` (case-insensitive), in manifest order.
    pub fn filter_chats(&self, query: &str) -> Vec<&ChatSummary> {
        let needle = query.trim().to_lowercase();
        self.chats
            .iter()
            .filter(|chat| needle.is_empty() || chat.title.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn chat(&self, chat_id: &str) -> Option<&ChatSummary> {
        self.chats.iter().find(|chat| chat.chat_id == chat_id)
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages
            .unwrap_or_else(|| self.chats.iter().map(|c| c.message_count).sum())
    }
}

/// One chunk descriptor in a chat manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkInfo {
    pub filename: String,
    #[serde(default)]
    pub start_id: Option<String>,
    #[serde(default)]
    pub end_id: Option<String>,
    #[serde(default)]
    pub message_count: Option<u64>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// `data/<chat_id>/manifest.json`. Chunks are in chronological order and
/// addressed by a 1-based index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatManifest {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default)]
    pub chunks: Vec<ChunkInfo>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub search_file: Option<String>,
}

impl ChatManifest {
    /// Number of addressable chunks. The declared count is trusted only as far
    /// as the chunk list backs it.
    pub fn chunk_total(&self) -> usize {
        if self.chunk_count == 0 {
            self.chunks.len()
        } else {
            self.chunk_count.min(self.chunks.len())
        }
    }

    /// Chunk descriptor by 1-based index.
    pub fn chunk(&self, index: usize) -> Option<&ChunkInfo> {
        if index == 0 || index > self.chunk_total() {
            return None;
        }
        self.chunks.get(index - 1)
    }

    /// 1-based index of a chunk by filename.
    pub fn index_of(&self, filename: &str) -> Option<usize> {
        self.chunks
            .iter()
            .take(self.chunk_total())
            .position(|c| c.filename == filename)
            .map(|pos| pos + 1)
    }
}

/// Media kind of an attachment. Unknown kinds are treated as plain files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Photo,
    Sticker,
    Video,
    RoundVideo,
    Voice,
    #[serde(other)]
    File,
}

impl AttachmentKind {
    /// Short label used where the media itself is not shown (reply previews).
    pub fn label(self) -> &'static str {
        match self {
            AttachmentKind::Photo => "📷 Photo",
            AttachmentKind::Sticker => "Sticker",
            AttachmentKind::Video => "🎬 Video",
            AttachmentKind::RoundVideo => "Video message",
            AttachmentKind::Voice => "🎤 Voice message",
            AttachmentKind::File => "📎 File",
        }
    }
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachmentKind::Photo => write!(f, "photo"),
            AttachmentKind::Sticker => write!(f, "sticker"),
            AttachmentKind::Video => write!(f, "video"),
            AttachmentKind::RoundVideo => write!(f, "round_video"),
            AttachmentKind::Voice => write!(f, "voice"),
            AttachmentKind::File => write!(f, "file"),
        }
    }
}

/// A media file attached to a message; `href` is relative to the archive root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub href: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

impl Attachment {
    /// Sibling `_thumb.jpg` path for JPEG photos. Existence is not checked;
    /// the renderer falls back to `href` when the thumbnail fails to load.
    pub fn thumbnail_href(&self) -> Option<String> {
        if self.kind != AttachmentKind::Photo {
            return None;
        }
        let lower = self.href.to_ascii_lowercase();
        let stem_len = lower.strip_suffix(".jpg").map(str::len)?;
        let (stem, ext) = self.href.split_at(stem_len);
        Some(format!("{stem}_thumb{ext}"))
    }

    /// Animated stickers ship as `.tgs` and cannot be shown as images.
    pub fn is_animated_sticker(&self) -> bool {
        self.kind == AttachmentKind::Sticker && self.href.to_ascii_lowercase().ends_with(".tgs")
    }
}

/// Call record kinds written by the export build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Incoming,
    Outgoing,
    Missed,
    Cancelled,
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallKind::Incoming => write!(f, "Incoming call"),
            CallKind::Outgoing => write!(f, "Outgoing call"),
            CallKind::Missed => write!(f, "Missed call"),
            CallKind::Cancelled => write!(f, "Cancelled call"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: CallKind,
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forwarded {
    pub from: String,
    pub date: Option<String>,
}

/// System row (joins, title changes, pins...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMessage {
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub text: String,
}

/// A regular message sent by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserMessage {
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub from_name: Option<String>,
    pub plain_text: Option<String>,
    pub html_text: Option<String>,
    pub reply_to: Option<String>,
    pub forwarded: Option<Forwarded>,
    pub call: Option<Call>,
    pub attachments: Vec<Attachment>,
}

/// A message as held by the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawMessage", into = "RawMessage")]
pub enum Message {
    Service(ServiceMessage),
    User(UserMessage),
}

impl Message {
    pub fn id(&self) -> Option<&str> {
        match self {
            Message::Service(m) => m.id.as_deref(),
            Message::User(m) => m.id.as_deref(),
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Message::Service(m) => m.timestamp,
            Message::User(m) => m.timestamp,
        }
    }

    /// UTC calendar day of the message.
    pub fn date(&self) -> Option<NaiveDate> {
        self.timestamp().map(|ts| ts.date_naive())
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Message::Service(_))
    }

    pub fn sender(&self) -> Option<&str> {
        match self {
            Message::Service(_) => None,
            Message::User(m) => m.from_name.as_deref(),
        }
    }

    /// Searchable plain text of the message, if any.
    pub fn text(&self) -> Option<&str> {
        let text = match self {
            Message::Service(m) => Some(m.text.as_str()),
            Message::User(m) => m.plain_text.as_deref(),
        };
        text.filter(|t| !t.trim().is_empty())
    }

    pub fn attachments(&self) -> &[Attachment] {
        match self {
            Message::Service(_) => &[],
            Message::User(m) => &m.attachments,
        }
    }

    /// Short preview: text truncated to `max_chars`, or the label of the
    /// first attachment when there is no text.
    pub fn snippet(&self, max_chars: usize) -> String {
        if let Some(text) = self.text() {
            return truncate(text, max_chars);
        }
        if let Some(att) = self.attachments().first() {
            return att.kind.label().to_string();
        }
        if let Message::User(UserMessage {
            call: Some(call), ..
        }) = self
        {
            return call.kind.to_string();
        }
        String::new()
    }

    /// Whether the message text contains `needle_lower` (already lowercased).
    pub fn matches(&self, needle_lower: &str) -> bool {
        self.text()
            .is_some_and(|t| t.to_lowercase().contains(needle_lower))
    }
}

/// Truncate on a character boundary, appending an ellipsis when shortened.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Parse a timestamp as written by the export build. Naive values are taken
/// as UTC; values with an offset are converted; a bare date means midnight.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Wire shape of one element of a chunk file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub dt_iso: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub is_service: bool,
    #[serde(default)]
    pub plain_text: Option<String>,
    #[serde(default)]
    pub html_text: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub forwarded_from: Option<String>,
    #[serde(default)]
    pub forwarded_date: Option<String>,
    #[serde(default)]
    pub call_type: Option<CallKind>,
    #[serde(default)]
    pub call_duration: Option<u64>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Self {
        let id = non_empty(raw.message_id);
        let timestamp = raw.dt_iso.as_deref().and_then(parse_timestamp);

        if raw.is_service {
            return Message::Service(ServiceMessage {
                id,
                timestamp,
                text: raw.plain_text.unwrap_or_default(),
            });
        }

        Message::User(UserMessage {
            id,
            timestamp,
            from_name: non_empty(raw.from_name),
            plain_text: non_empty(raw.plain_text),
            html_text: non_empty(raw.html_text),
            reply_to: non_empty(raw.reply_to),
            forwarded: non_empty(raw.forwarded_from).map(|from| Forwarded {
                from,
                date: non_empty(raw.forwarded_date),
            }),
            call: raw.call_type.map(|kind| Call {
                kind,
                duration_secs: raw.call_duration,
            }),
            attachments: raw.attachments,
        })
    }
}

impl From<Message> for RawMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Service(m) => RawMessage {
                message_id: m.id,
                dt_iso: m.timestamp.map(format_timestamp),
                is_service: true,
                plain_text: Some(m.text),
                ..RawMessage::default()
            },
            Message::User(m) => {
                let (forwarded_from, forwarded_date) = match m.forwarded {
                    Some(f) => (Some(f.from), f.date),
                    None => (None, None),
                };
                RawMessage {
                    message_id: m.id,
                    dt_iso: m.timestamp.map(format_timestamp),
                    from_name: m.from_name,
                    is_service: false,
                    plain_text: m.plain_text,
                    html_text: m.html_text,
                    reply_to: m.reply_to,
                    forwarded_from,
                    forwarded_date,
                    call_type: m.call.as_ref().map(|c| c.kind),
                    call_duration: m.call.and_then(|c| c.duration_secs),
                    attachments: m.attachments,
                }
            }
        }
    }
}

/// One row of `data/<chat_id>/search.json`. Older exports use the long
/// field names, so both spellings are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchEntry {
    #[serde(alias = "message_id")]
    pub id: String,
    #[serde(alias = "plain_text", default)]
    pub text: String,
    #[serde(alias = "from_name", default)]
    pub from: Option<String>,
    #[serde(alias = "dt_iso", default)]
    pub dt: Option<String>,
}

impl SearchEntry {
    pub fn date(&self) -> Option<NaiveDate> {
        self.dt
            .as_deref()
            .and_then(parse_timestamp)
            .map(|ts| ts.date_naive())
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
