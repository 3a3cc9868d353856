//! tgview-core: incremental viewer engine for static Telegram chat exports
//!
//! This crate reads the JSON layout produced by the export build step
//! (global manifest, per-chat manifests, message chunks, search indexes) and
//! maintains a paginated, ordered view of one chat at a time: chunk loading
//! in both directions, feed rendering with date separators and sender
//! grouping, scroll preservation, and navigation to messages that are not
//! loaded yet.

pub mod config;
pub mod error;
pub mod loader;
pub mod models;
pub mod navigate;
pub mod pager;
pub mod render;
pub mod sanitize;
pub mod search;
pub mod session;
pub mod store;
pub mod viewer;

pub use config::Config;
pub use error::Error;
pub use error::Result;
pub use loader::{ArchiveSource, ChunkLoader, DirSource, HttpSource};
pub use session::Session;
pub use store::MessageStore;
pub use viewer::Viewer;

/// Application name used for config directories and paths.
pub const APP_NAME: &str = "tgview";

/// Returns the environment variable prefix for this application.
pub fn env_prefix() -> String {
    "TGVIEW".to_string()
}
