//! Message navigation helpers: owning-chunk lookup, deep-link routes,
//! date targets and the transient highlight.

use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::time::Instant;

use crate::models::{ChatManifest, parse_timestamp};

/// Numeric ordinal of a message id: its digits read as one number
/// (`message42` and `m42` both give 42).
pub fn message_ordinal(message_id: &str) -> Option<u64> {
    let digits: String = message_id.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// 1-based index of the chunk whose `start_id..=end_id` range holds the
/// message. Chunks without a usable range are skipped.
pub fn owning_chunk(manifest: &ChatManifest, message_id: &str) -> Option<usize> {
    let ordinal = message_ordinal(message_id)?;
    manifest
        .chunks
        .iter()
        .take(manifest.chunk_total())
        .position(|chunk| {
            let start = chunk.start_id.as_deref().and_then(message_ordinal);
            let end = chunk.end_id.as_deref().and_then(message_ordinal);
            matches!((start, end), (Some(s), Some(e)) if (s..=e).contains(&ordinal))
        })
        .map(|pos| pos + 1)
}

/// 1-based index of the first chunk that ends on or after `date`.
pub fn chunk_for_date(manifest: &ChatManifest, date: NaiveDate) -> Option<usize> {
    manifest
        .chunks
        .iter()
        .take(manifest.chunk_total())
        .position(|chunk| {
            chunk
                .end_date
                .as_deref()
                .and_then(parse_timestamp)
                .is_some_and(|end| end.date_naive() >= date)
        })
        .map(|pos| pos + 1)
}

/// A message to bring into view. `chunk` is the owning chunk filename when
/// the caller already knows it (search hits).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavTarget {
    pub message_id: String,
    pub chunk: Option<String>,
}

impl NavTarget {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            chunk: None,
        }
    }

    pub fn in_chunk(message_id: impl Into<String>, chunk: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            chunk: Some(chunk.into()),
        }
    }

    /// Owning chunk index: the filename hint when the manifest knows it,
    /// otherwise the id range lookup.
    pub fn resolve_chunk(&self, manifest: &ChatManifest) -> Option<usize> {
        self.chunk
            .as_deref()
            .and_then(|file| manifest.index_of(file))
            .or_else(|| owning_chunk(manifest, &self.message_id))
    }
}

/// Result of a navigation request. Navigation never fails loudly; an
/// unresolved target leaves the view where it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum NavOutcome {
    Shown { message_id: String },
    Unresolved { message_id: String, reason: String },
}

impl NavOutcome {
    pub fn is_shown(&self) -> bool {
        matches!(self, NavOutcome::Shown { .. })
    }
}

/// Where a date lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateTarget {
    /// First message on or after the date, known from the search index.
    Message(NavTarget),
    /// The chunk covering the date; the message is picked once it is loaded.
    Chunk(usize),
}

/// Location-fragment route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Empty fragment: no chat selected.
    Welcome,
    Chat(String),
}

/// Parse a location fragment (`#chat_001`, `chat_001` or empty).
pub fn parse_fragment(fragment: &str) -> Route {
    let id = fragment.trim().trim_start_matches('#').trim();
    if id.is_empty() {
        Route::Welcome
    } else {
        Route::Chat(id.to_string())
    }
}

/// Transient emphasis on a message after navigating to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub message_id: String,
    pub until: Instant,
}

impl Highlight {
    pub fn new(message_id: impl Into<String>, duration: Duration) -> Self {
        Self {
            message_id: message_id.into(),
            until: Instant::now() + duration,
        }
    }

    pub fn is_active(&self) -> bool {
        Instant::now() < self.until
    }
}
