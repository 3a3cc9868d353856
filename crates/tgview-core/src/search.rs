//! In-chat and cross-chat search, the match cursor, the debouncer and the
//! media gallery filter.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::loader::ChunkLoader;
use crate::models::{Attachment, AttachmentKind, ChatSummary, Message, SearchEntry, truncate};
use crate::sanitize::escape_html;

/// Characters of context kept on each side of the first match.
const CONTEXT_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub min_query_len: usize,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_query_len: 2,
            limit: 50,
        }
    }
}

/// Lowercased query, or `None` when it is too short to run.
pub fn normalize_query(query: &str, min_len: usize) -> Option<String> {
    let query = query.trim();
    if query.chars().count() < min_len.max(1) {
        return None;
    }
    Some(query.to_lowercase())
}

/// One in-chat match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub message_id: String,
    pub from: Option<String>,
    pub date: Option<String>,
    /// Escaped excerpt with matches wrapped in `<mark>`.
    pub snippet_html: String,
    /// Plain excerpt.
    pub snippet: String,
}

/// Search the chat's search index.
pub fn search_entries(entries: &[SearchEntry], query: &str, opts: SearchOptions) -> Vec<SearchHit> {
    let Some(needle) = normalize_query(query, opts.min_query_len) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|e| e.text.to_lowercase().contains(&needle))
        .take(opts.limit)
        .map(|e| hit(e.id.clone(), e.from.clone(), e.dt.clone(), &e.text, query))
        .collect()
}

/// Search loaded messages, used when the chat has no search index.
pub fn search_messages(messages: &[Arc<Message>], query: &str, opts: SearchOptions) -> Vec<SearchHit> {
    let Some(needle) = normalize_query(query, opts.min_query_len) else {
        return Vec::new();
    };
    messages
        .iter()
        .filter(|m| m.matches(&needle))
        .filter_map(|m| {
            let id = m.id()?.to_string();
            let text = m.text()?;
            Some(hit(
                id,
                m.sender().map(str::to_string),
                m.timestamp().map(|ts| ts.to_rfc3339()),
                text,
                query,
            ))
        })
        .take(opts.limit)
        .collect()
}

fn hit(
    message_id: String,
    from: Option<String>,
    date: Option<String>,
    text: &str,
    query: &str,
) -> SearchHit {
    let snippet = excerpt(text, query);
    SearchHit {
        message_id,
        from,
        date,
        snippet_html: highlight_snippet(&snippet, query),
        snippet,
    }
}

/// Window of text around the first case-insensitive match of `query`.
pub fn excerpt(text: &str, query: &str) -> String {
    let text = text.trim();
    let Some(re) = match_regex(query) else {
        return truncate(text, CONTEXT_CHARS * 2);
    };
    let Some(found) = re.find(text) else {
        return truncate(text, CONTEXT_CHARS * 2);
    };
    let before = text[..found.start()].chars().count();
    let start = before.saturating_sub(CONTEXT_CHARS);
    let keep = (before - start) + found.as_str().chars().count() + CONTEXT_CHARS;
    let body: String = text.chars().skip(start).take(keep).collect();
    let mut out = String::new();
    if start > 0 {
        out.push('…');
    }
    out.push_str(&body);
    if start + keep < text.chars().count() {
        out.push('…');
    }
    out
}

/// Wrap every case-insensitive match of `query` in `<mark>`. Matches are
/// found in the raw text and each segment is escaped on its own.
pub fn highlight_snippet(text: &str, query: &str) -> String {
    let Some(re) = match_regex(query) else {
        return escape_html(text);
    };
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;
    for found in re.find_iter(text) {
        out.push_str(&escape_html(&text[last..found.start()]));
        out.push_str("<mark>");
        out.push_str(&escape_html(found.as_str()));
        out.push_str("</mark>");
        last = found.end();
    }
    out.push_str(&escape_html(&text[last..]));
    out
}

fn match_regex(query: &str) -> Option<Regex> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Ordered match ids plus the current position. Lives in the view-model;
/// rendered output only reflects it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchCursor {
    ids: Vec<String>,
    current: Option<usize>,
}

impl MatchCursor {
    /// New cursor positioned on the first match.
    pub fn new(ids: Vec<String>) -> Self {
        let current = if ids.is_empty() { None } else { Some(0) };
        Self { ids, current }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.current = None;
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn current(&self) -> Option<&str> {
        self.current.map(|i| self.ids[i].as_str())
    }

    /// Advance with wrap-around.
    pub fn next(&mut self) -> Option<&str> {
        let len = self.ids.len();
        if len == 0 {
            return None;
        }
        self.current = Some(self.current.map_or(0, |i| (i + 1) % len));
        self.current()
    }

    /// Step back with wrap-around.
    pub fn prev(&mut self) -> Option<&str> {
        let len = self.ids.len();
        if len == 0 {
            return None;
        }
        self.current = Some(self.current.map_or(len - 1, |i| (i + len - 1) % len));
        self.current()
    }

    /// `i/n` counter, 1-based; `0/0` without matches.
    pub fn position(&self) -> String {
        match self.current {
            Some(i) => format!("{}/{}", i + 1, self.ids.len()),
            None => "0/0".to_string(),
        }
    }
}

/// Match found by cross-chat search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalHit {
    pub message_id: String,
    pub from: Option<String>,
    pub snippet: String,
    pub chunk_file: String,
    /// 1-based chunk index.
    pub chunk_index: usize,
}

/// Cross-chat matches for one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatResults {
    pub chat_id: String,
    pub title: String,
    pub hits: Vec<GlobalHit>,
}

/// Scan every chunk of every chat for `query`. Chats are searched with at
/// most `concurrency` in flight; results keep the chat-list order. A chat
/// whose manifest fails is logged and skipped; a failing chunk only loses
/// its own matches.
pub async fn cross_chat_search(
    loader: &ChunkLoader,
    chats: &[ChatSummary],
    query: &str,
    opts: SearchOptions,
    concurrency: usize,
) -> Vec<ChatResults> {
    let Some(needle) = normalize_query(query, opts.min_query_len) else {
        return Vec::new();
    };
    let needle = needle.as_str();

    stream::iter(chats)
        .map(|chat| async move {
            match search_chat(loader, chat, needle, query, opts.limit).await {
                Ok(results) => Some(results),
                Err(e) => {
                    warn!(chat = %chat.chat_id, error = %e, "skipping chat in global search");
                    None
                }
            }
        })
        .buffered(concurrency.max(1))
        .filter_map(|results| async move { results.filter(|r| !r.hits.is_empty()) })
        .collect()
        .await
}

async fn search_chat(
    loader: &ChunkLoader,
    chat: &ChatSummary,
    needle: &str,
    query: &str,
    limit: usize,
) -> Result<ChatResults> {
    let manifest = loader.chat_manifest(&chat.chat_id).await?;
    let mut hits = Vec::new();

    'chunks: for (pos, chunk) in manifest.chunks.iter().take(manifest.chunk_total()).enumerate() {
        let messages = match loader.fetch_chunk(&chat.chat_id, &chunk.filename).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(
                    chat = %chat.chat_id,
                    file = %chunk.filename,
                    error = %e,
                    "skipping chunk in global search"
                );
                continue;
            }
        };
        for message in &messages {
            if !message.matches(needle) {
                continue;
            }
            let (Some(id), Some(text)) = (message.id(), message.text()) else {
                continue;
            };
            hits.push(GlobalHit {
                message_id: id.to_string(),
                from: message.sender().map(str::to_string),
                snippet: excerpt(text, query),
                chunk_file: chunk.filename.clone(),
                chunk_index: pos + 1,
            });
            if hits.len() >= limit {
                break 'chunks;
            }
        }
    }

    debug!(chat = %chat.chat_id, hits = hits.len(), "searched chat");
    Ok(ChatResults {
        chat_id: chat.chat_id.clone(),
        title: if manifest.title.is_empty() {
            chat.title.clone()
        } else {
            manifest.title
        },
        hits,
    })
}

/// Trailing-edge debounce: every trigger supersedes the ones before it and
/// only the latest proceeds once the idle window has passed.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Register a trigger and wait out the idle window. Returns `true` when
    /// no newer trigger arrived meanwhile.
    pub async fn settle(&self) -> bool {
        let mine = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        self.generation.load(Ordering::SeqCst) == mine
    }
}

/// Gallery filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFilter {
    Photo,
    /// Regular and round videos.
    Video,
    Voice,
    File,
}

impl MediaFilter {
    pub fn matches(self, kind: AttachmentKind) -> bool {
        match self {
            MediaFilter::Photo => kind == AttachmentKind::Photo,
            MediaFilter::Video => matches!(kind, AttachmentKind::Video | AttachmentKind::RoundVideo),
            MediaFilter::Voice => kind == AttachmentKind::Voice,
            MediaFilter::File => kind == AttachmentKind::File,
        }
    }
}

impl FromStr for MediaFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "photo" | "photos" => Ok(MediaFilter::Photo),
            "video" | "videos" => Ok(MediaFilter::Video),
            "voice" => Ok(MediaFilter::Voice),
            "file" | "files" => Ok(MediaFilter::File),
            other => Err(Error::Other(format!("Unknown media kind: {other}"))),
        }
    }
}

/// One gallery entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    pub message_id: Option<String>,
    pub from: Option<String>,
    pub date: Option<String>,
    pub attachment: Attachment,
}

/// Attachments of the loaded log in chronological order. Stickers are not
/// gallery media and only appear without a filter.
pub fn media_items(messages: &[Arc<Message>], filter: Option<MediaFilter>) -> Vec<MediaItem> {
    messages
        .iter()
        .flat_map(|m| {
            m.attachments()
                .iter()
                .filter(move |a| match filter {
                    Some(f) => f.matches(a.kind),
                    None => true,
                })
                .map(move |a| MediaItem {
                    message_id: m.id().map(str::to_string),
                    from: m.sender().map(str::to_string),
                    date: m.timestamp().map(|ts| ts.to_rfc3339()),
                    attachment: a.clone(),
                })
        })
        .collect()
}
