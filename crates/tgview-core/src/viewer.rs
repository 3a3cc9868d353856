//! Application controller: owns the loader and the session and drives the
//! plan → fetch → complete cycle for every user action.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::loader::ChunkLoader;
use crate::models::GlobalManifest;
use crate::navigate::{DateTarget, NavOutcome, NavTarget, Route, parse_fragment};
use crate::pager::PagerState;
use crate::search::{self, ChatResults, Debouncer, GlobalHit, SearchHit, SearchOptions};
use crate::session::{ChunkRequest, Navigation, Session};

#[derive(Debug)]
pub struct Viewer {
    loader: ChunkLoader,
    session: Session,
    config: Config,
    chats: Option<Arc<GlobalManifest>>,
    debouncer: Debouncer,
}

impl Viewer {
    pub fn new(loader: ChunkLoader, config: Config) -> Self {
        Self {
            session: Session::new(&config),
            debouncer: Debouncer::new(config.search.debounce()),
            loader,
            config,
            chats: None,
        }
    }

    pub fn from_config(config: Config) -> Result<Self> {
        Ok(Self::new(ChunkLoader::from_config(&config)?, config))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn loader(&self) -> &ChunkLoader {
        &self.loader
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Debouncer shared by the keystroke-driven searches. Clones count
    /// their triggers against the same window.
    pub fn search_debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// The chat list, fetched once.
    pub async fn chats(&mut self) -> Result<Arc<GlobalManifest>> {
        if let Some(chats) = &self.chats {
            return Ok(Arc::clone(chats));
        }
        let chats = Arc::new(self.loader.global_manifest().await?);
        info!(
            chats = chats.chats.len(),
            source = %self.loader.describe(),
            "loaded chat list"
        );
        self.chats = Some(Arc::clone(&chats));
        Ok(chats)
    }

    /// Select a chat and load its initial chunk. With a `target`, the
    /// initial chunk is the one holding it and the view lands on it.
    pub async fn open_chat(&mut self, chat_id: &str, target: Option<NavTarget>) -> Result<()> {
        let ticket = self.session.select_chat(chat_id, target);

        let manifest = match self.loader.chat_manifest(chat_id).await {
            Ok(manifest) => manifest,
            Err(e) => {
                self.session
                    .manifest_loaded(&ticket, Err(Error::Other(e.to_string())));
                return Err(e);
            }
        };

        let search_file = manifest.search_file.clone();
        let request = self.session.manifest_loaded(&ticket, Ok(manifest));

        let index = match self.loader.search_index(chat_id, search_file.as_deref()).await {
            Ok(index) => index,
            Err(e) => {
                warn!(chat = %chat_id, error = %e, "search index fetch failed");
                None
            }
        };
        self.session.set_search_index(&ticket, index);

        if let Some(request) = request {
            self.run(&request).await?;
        }
        match self.session.state() {
            PagerState::Error(reason) => Err(Error::ChunkUnavailable(reason.clone())),
            _ => Ok(()),
        }
    }

    /// Follow a location fragment. An empty fragment closes the chat;
    /// re-selecting the loaded chat with a target only navigates.
    pub async fn open_fragment(
        &mut self,
        fragment: &str,
        target: Option<NavTarget>,
    ) -> Result<Option<NavOutcome>> {
        match parse_fragment(fragment) {
            Route::Welcome => {
                self.session.dispose();
                Ok(None)
            }
            Route::Chat(chat_id) => {
                let loaded = self.session.chat_id() == Some(chat_id.as_str())
                    && !matches!(self.session.state(), PagerState::Error(_))
                    && !self.session.store().is_empty();
                match (loaded, target) {
                    (true, Some(target)) => Ok(Some(self.go_to(target).await)),
                    (true, None) => Ok(None),
                    (false, target) => {
                        let message_id = target.as_ref().map(|t| t.message_id.clone());
                        self.open_chat(&chat_id, target).await?;
                        Ok(message_id.map(|id| self.outcome_after_open(id)))
                    }
                }
            }
        }
    }

    fn outcome_after_open(&self, message_id: String) -> NavOutcome {
        if self.session.feed().contains(&message_id) {
            NavOutcome::Shown { message_id }
        } else {
            NavOutcome::Unresolved {
                message_id,
                reason: "not found in the archive".to_string(),
            }
        }
    }

    /// Load the next older chunk. `Ok(false)` when there is nothing to do
    /// (boundary, or a load already in flight).
    pub async fn load_older(&mut self) -> Result<bool> {
        match self.session.plan_older() {
            Some(request) => self.run(&request).await,
            None => Ok(false),
        }
    }

    pub async fn load_newer(&mut self) -> Result<bool> {
        match self.session.plan_newer() {
            Some(request) => self.run(&request).await,
            None => Ok(false),
        }
    }

    /// Load every chunk of the open chat that is still missing, newest
    /// first. A failing chunk is skipped; the failures are returned.
    pub async fn load_all(&mut self) -> Vec<Error> {
        let total = self.session.manifest().map_or(0, |m| m.chunk_total());
        let mut failures = Vec::new();
        for index in (1..=total).rev() {
            if self.session.store().contains_chunk(index) {
                continue;
            }
            let Some(request) = self.session.plan_jump(index) else {
                break;
            };
            if let Err(e) = self.run(&request).await {
                failures.push(e);
            }
        }
        failures
    }

    async fn run(&mut self, request: &ChunkRequest) -> Result<bool> {
        debug!(chat = %request.chat_id(), file = %request.filename, kind = %request.kind, "loading chunk");
        let result = self
            .loader
            .fetch_chunk(request.chat_id(), &request.filename)
            .await;
        self.session.complete(request, result)
    }

    /// Bring a message into view, loading its chunk when needed. Failures
    /// are logged and reported in the outcome; the view stays put.
    pub async fn go_to(&mut self, target: NavTarget) -> NavOutcome {
        let message_id = target.message_id.clone();
        let unresolved = |reason: String| {
            warn!(message = %message_id, reason = %reason, "navigation failed");
            NavOutcome::Unresolved {
                message_id: message_id.clone(),
                reason,
            }
        };

        match self.session.navigate(target) {
            Navigation::Shown => NavOutcome::Shown {
                message_id: message_id.clone(),
            },
            Navigation::Unresolvable(reason) => unresolved(reason),
            Navigation::Load(request) => match self.run(&request).await {
                Ok(_) if self.session.feed().contains(&message_id) => {
                    NavOutcome::Shown {
                        message_id: message_id.clone(),
                    }
                }
                Ok(_) => unresolved(
                    Error::MessageNotFound(format!("{message_id} in {}", request.filename))
                        .to_string(),
                ),
                Err(e) => unresolved(e.to_string()),
            },
        }
    }

    /// Open a cross-chat search hit in its chat.
    pub async fn go_to_hit(&mut self, chat_id: &str, hit: &GlobalHit) -> Result<NavOutcome> {
        let target = NavTarget::in_chunk(hit.message_id.clone(), hit.chunk_file.clone());
        if self.session.chat_id() == Some(chat_id) && !self.session.store().is_empty() {
            return Ok(self.go_to(target).await);
        }
        self.open_chat(chat_id, Some(target)).await?;
        Ok(self.outcome_after_open(hit.message_id.clone()))
    }

    /// Scroll to the first message on or after `date`.
    pub async fn jump_to_date(&mut self, date: NaiveDate) -> NavOutcome {
        let label = date.to_string();
        match self.session.locate_date(date) {
            Some(DateTarget::Message(target)) => self.go_to(target).await,
            Some(DateTarget::Chunk(index)) => {
                let Some(request) = self.session.plan_jump(index) else {
                    return NavOutcome::Unresolved {
                        message_id: label,
                        reason: "another load is in progress".to_string(),
                    };
                };
                if let Err(e) = self.run(&request).await {
                    warn!(date = %label, error = %e, "jump to date failed");
                    return NavOutcome::Unresolved {
                        message_id: label,
                        reason: e.to_string(),
                    };
                }
                match self.session.first_loaded_on_or_after(date) {
                    Some(id) => self.go_to(NavTarget::new(id)).await,
                    None => NavOutcome::Unresolved {
                        message_id: label,
                        reason: "no messages on or after this date".to_string(),
                    },
                }
            }
            None => NavOutcome::Unresolved {
                message_id: label,
                reason: "no messages on or after this date".to_string(),
            },
        }
    }

    /// In-chat search; also resets the match cursor.
    pub fn search(&mut self, query: &str) -> Vec<SearchHit> {
        self.session.search(query)
    }

    /// Keystroke-driven in-chat search. Waits out the idle window and
    /// returns `None` when a newer trigger superseded this one.
    pub async fn search_debounced(&mut self, query: &str) -> Option<Vec<SearchHit>> {
        if !self.debouncer.settle().await {
            debug!(query, "search superseded");
            return None;
        }
        Some(self.search(query))
    }

    /// Keystroke-driven cross-chat search; `Ok(None)` when superseded.
    pub async fn cross_search_debounced(&mut self, query: &str) -> Result<Option<Vec<ChatResults>>> {
        if !self.debouncer.settle().await {
            debug!(query, "global search superseded");
            return Ok(None);
        }
        self.cross_search(query).await.map(Some)
    }

    /// Search every chat of the archive.
    pub async fn cross_search(&mut self, query: &str) -> Result<Vec<ChatResults>> {
        let chats = self.chats().await?;
        let opts = SearchOptions {
            min_query_len: self.config.search.min_query_len,
            limit: self.config.search.result_limit,
        };
        Ok(search::cross_chat_search(
            &self.loader,
            &chats.chats,
            query,
            opts,
            self.config.search.global_concurrency,
        )
        .await)
    }
}
