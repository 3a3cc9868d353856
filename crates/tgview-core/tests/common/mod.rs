//! Shared fixtures: an in-memory archive with a request log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tgview_core::loader::FetchError;
use tgview_core::{ArchiveSource, ChunkLoader, Config, Viewer};

pub const PER_CHUNK: usize = 20;

#[derive(Debug, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
    broken: Vec<String>,
    requests: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn with(mut self, path: &str, body: &Value) -> Self {
        self.files.insert(path.to_string(), body.to_string().into_bytes());
        self
    }

    /// Requests for `path` fail at the transport level.
    pub fn failing(mut self, path: &str) -> Self {
        self.broken.push(path.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|p| p.as_str() == path).count()
    }
}

#[async_trait]
impl ArchiveSource for MemorySource {
    async fn read(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(path.to_string());
        }
        if self.broken.iter().any(|p| p == path) {
            return Err(FetchError::Transport(format!("connection reset: {path}")));
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(path.to_string()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Message id of the `n`th message (0-based) of chunk `index` (1-based).
/// Ids start at `m20`, so chunk 2 holds `m40..=m59`.
pub fn id(index: usize, n: usize) -> String {
    format!("m{}", index * PER_CHUNK + n)
}

pub fn chunk_path(chat_id: &str, index: usize) -> String {
    format!("data/{chat_id}/chunks/chunk_{index:04}.json")
}

/// Messages of one chunk: one day per chunk, one minute apart, alternating
/// senders.
pub fn chunk_messages(chat_id: &str, index: usize) -> Vec<Value> {
    (0..PER_CHUNK)
        .map(|n| {
            let from = if n % 2 == 0 { "Ann" } else { "Bob" };
            json!({
                "message_id": id(index, n),
                "from_name": from,
                "dt_iso": format!("2021-05-{index:02}T10:{n:02}:00"),
                "plain_text": format!("{chat_id} message {}", id(index, n)),
            })
        })
        .collect()
}

pub fn chat_manifest(chat_id: &str, title: &str, chunks: usize) -> Value {
    json!({
        "chat_id": chat_id,
        "title": title,
        "message_count": chunks * PER_CHUNK,
        "chunk_count": chunks,
        "chunks": (1..=chunks).map(|i| json!({
            "filename": format!("chunk_{i:04}.json"),
            "start_id": id(i, 0),
            "end_id": id(i, PER_CHUNK - 1),
            "message_count": PER_CHUNK,
            "start_date": format!("2021-05-{i:02}T10:00:00"),
            "end_date": format!("2021-05-{i:02}T10:{:02}:00", PER_CHUNK - 1),
        })).collect::<Vec<_>>(),
    })
}

/// Add a chat with `chunks` chunks to `source`.
pub fn with_chat(mut source: MemorySource, chat_id: &str, title: &str, chunks: usize) -> MemorySource {
    source = source.with(
        &format!("data/{chat_id}/manifest.json"),
        &chat_manifest(chat_id, title, chunks),
    );
    for index in 1..=chunks {
        source = source.with(
            &chunk_path(chat_id, index),
            &Value::Array(chunk_messages(chat_id, index)),
        );
    }
    source
}

pub fn global_manifest(chats: &[(&str, &str)]) -> Value {
    json!({
        "chats": chats.iter().map(|(id, title)| json!({
            "chat_id": id,
            "title": title,
            "message_count": 60,
        })).collect::<Vec<_>>(),
        "total_chats": chats.len(),
    })
}

/// Two chats of three chunks each.
pub fn two_chats() -> MemorySource {
    let source = MemorySource::default().with(
        "data/manifest.json",
        &global_manifest(&[("chat_a", "Alpha"), ("chat_b", "Beta")]),
    );
    let source = with_chat(source, "chat_a", "Alpha", 3);
    with_chat(source, "chat_b", "Beta", 3)
}

pub fn viewer(source: &Arc<MemorySource>) -> Viewer {
    let source: Arc<dyn ArchiveSource> = source.clone();
    Viewer::new(ChunkLoader::new(source), Config::default())
}
