//! Archive access: manifests, message chunks and search indexes.
//!
//! Transport is behind [`ArchiveSource`] so the same loader reads a local
//! export directory or a statically hosted copy over HTTP. Every failure is
//! converted here into one of the crate's error kinds; nothing is retried.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{ChatManifest, GlobalManifest, Message, SearchEntry};

/// Path of the global manifest, relative to the archive root.
pub const GLOBAL_MANIFEST_PATH: &str = "data/manifest.json";

/// Default per-chat search index filename.
pub const SEARCH_FILE: &str = "search.json";

/// Low-level transport failure.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} for {path}")]
    Status { status: u16, path: String },

    #[error("{0}")]
    Transport(String),
}

/// Reads raw bytes of archive files by root-relative path.
#[async_trait]
pub trait ArchiveSource: Send + Sync + std::fmt::Debug {
    async fn read(&self, path: &str) -> std::result::Result<Vec<u8>, FetchError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Export directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArchiveSource for DirSource {
    async fn read(&self, path: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let full = self.root.join(path);
        tokio::fs::read(&full).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(path.to_string()),
            _ => FetchError::Transport(format!("{}: {e}", full.display())),
        })
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Statically hosted export reachable over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSource {
    base: Url,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        // Url::join drops the last segment unless the base ends with '/'.
        let normalized = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| Error::Config(format!("Invalid archive URL {base}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { base, client })
    }
}

#[async_trait]
impl ArchiveSource for HttpSource {
    async fn read(&self, path: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| FetchError::Transport(format!("{path}: {e}")))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        self.base.to_string()
    }
}

/// Typed access to the archive layout.
#[derive(Debug, Clone)]
pub struct ChunkLoader {
    source: Arc<dyn ArchiveSource>,
}

impl ChunkLoader {
    pub fn new(source: Arc<dyn ArchiveSource>) -> Self {
        Self { source }
    }

    /// Pick the transport from the configured archive location.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source: Arc<dyn ArchiveSource> = if config.archive_is_remote() {
            Arc::new(HttpSource::new(
                &config.archive,
                Duration::from_secs(config.http.timeout_secs),
            )?)
        } else {
            Arc::new(DirSource::new(&config.archive))
        };
        Ok(Self::new(source))
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    pub async fn global_manifest(&self) -> Result<GlobalManifest> {
        self.read_json(GLOBAL_MANIFEST_PATH)
            .await
            .map_err(|e| Error::ManifestUnavailable(e.to_string()))
    }

    pub async fn chat_manifest(&self, chat_id: &str) -> Result<ChatManifest> {
        let path = format!("data/{}/manifest.json", segment(chat_id)?);
        self.read_json(&path)
            .await
            .map_err(|e| Error::ManifestUnavailable(format!("{chat_id}: {e}")))
    }

    /// Fetch and parse one chunk file. The caller checks the store first;
    /// this always issues a request.
    pub async fn fetch_chunk(&self, chat_id: &str, filename: &str) -> Result<Vec<Message>> {
        let path = format!("data/{}/chunks/{}", segment(chat_id)?, segment(filename)?);
        debug!(path = %path, "fetching chunk");
        match self.read_json::<Vec<Message>>(&path).await {
            Ok(messages) => Ok(messages),
            Err(LoadError::Fetch(FetchError::Transport(e))) => Err(Error::Network(e)),
            Err(e) => Err(Error::ChunkUnavailable(format!("{path}: {e}"))),
        }
    }

    /// Optional per-chat search index. A missing or unreadable index is not
    /// an error; the viewer falls back to scanning loaded messages.
    pub async fn search_index(
        &self,
        chat_id: &str,
        file: Option<&str>,
    ) -> Result<Option<Vec<SearchEntry>>> {
        let path = format!(
            "data/{}/{}",
            segment(chat_id)?,
            segment(file.unwrap_or(SEARCH_FILE))?
        );
        match self.read_json::<Vec<SearchEntry>>(&path).await {
            Ok(entries) => Ok(Some(entries)),
            Err(LoadError::Fetch(FetchError::Transport(e))) => Err(Error::Network(e)),
            Err(e) => {
                warn!(path = %path, error = %e, "search index unavailable");
                Ok(None)
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, LoadError> {
        let bytes = self.source.read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, thiserror::Error)]
enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Reject path components that could escape the archive root.
fn segment(value: &str) -> Result<&str> {
    if value.is_empty() || value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(Error::Other(format!("Invalid archive path component: {value:?}")));
    }
    Ok(value)
}
