//! Configuration types and loading for tgview.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::error::Result;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Archive root: a local directory holding `data/`, or an http(s) base URL.
    pub archive: String,

    /// Sender names rendered as outgoing ("self") messages.
    pub self_names: Vec<String>,

    /// Feed rendering options.
    pub render: RenderConfig,

    /// Chunk pagination options.
    pub pager: PagerConfig,

    /// Search options.
    pub search: SearchConfig,

    /// Message navigation options.
    pub navigation: NavigationConfig,

    /// HTTP transport options (used when `archive` is a URL).
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive: "./site".to_string(),
            self_names: Vec::new(),
            render: RenderConfig::default(),
            pager: PagerConfig::default(),
            search: SearchConfig::default(),
            navigation: NavigationConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific file, layered with `TGVIEW__*`
    /// environment overrides. A missing file yields defaults plus overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let prefix = crate::env_prefix();
        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(&prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("self_names"),
            )
            .build()?;
        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::APP_NAME)
            .join("config.toml")
    }

    /// Save configuration to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Ensure config exists at the given path, creating defaults if missing.
    pub fn ensure_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            Self::default().save_to_path(path)?;
        }
        Self::load_from_path(path)
    }

    /// Expand a path, replacing ~ with home directory.
    pub fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::full(path)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| path.to_string());
        PathBuf::from(expanded)
    }

    fn expand_paths(&mut self) {
        if !self.archive_is_remote() {
            self.archive = Self::expand_path(&self.archive)
                .to_string_lossy()
                .to_string();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.archive.trim().is_empty() {
            return Err(Error::Config("archive must not be empty".to_string()));
        }
        if self.search.min_query_len == 0 {
            return Err(Error::Config(
                "search.min_query_len must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the archive is served over HTTP rather than read from disk.
    pub fn archive_is_remote(&self) -> bool {
        let lower = self.archive.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

/// Feed rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Two messages of one sender group when they are less than this many
    /// minutes apart.
    /// Zero disables the time check (same sender and day is enough).
    pub grouping_gap_minutes: u64,

    /// chrono format string for date separators.
    pub date_format: String,

    /// chrono format string for message timestamps.
    pub time_format: String,

    /// Maximum characters of a reply preview snippet.
    pub reply_snippet_chars: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            grouping_gap_minutes: 10,
            date_format: "%A, %-d %B %Y".to_string(),
            time_format: "%H:%M".to_string(),
            reply_snippet_chars: 80,
        }
    }
}

impl RenderConfig {
    pub fn grouping_gap(&self) -> Option<chrono::Duration> {
        if self.grouping_gap_minutes == 0 {
            None
        } else {
            i64::try_from(self.grouping_gap_minutes)
                .ok()
                .map(chrono::Duration::minutes)
        }
    }
}

/// Which chunk to open when no navigation target names one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InitialChunk {
    /// Newest chunk (chat-app convention).
    #[default]
    Last,
    /// Oldest chunk.
    First,
}

/// Chunk pagination configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerConfig {
    pub initial_chunk: InitialChunk,
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Idle window before a keystroke-driven search runs.
    pub debounce_ms: u64,

    /// Queries shorter than this return no results.
    pub min_query_len: usize,

    /// Maximum in-chat results.
    pub result_limit: usize,

    /// Chats scanned concurrently by cross-chat search.
    pub global_concurrency: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            min_query_len: 2,
            result_limit: 50,
            global_concurrency: 4,
        }
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(300))
    }
}

/// Navigation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// How long a navigated-to message stays highlighted.
    pub highlight_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self { highlight_ms: 2000 }
    }
}

impl NavigationConfig {
    pub fn highlight(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
