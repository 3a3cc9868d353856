//! View-model for one viewer: the selected chat, its message store, pager,
//! rendered feed, scroll position, search state and pending navigation.
//!
//! Loads are two-phase. A `plan_*` call claims the work and returns a
//! request stamped with a [`Ticket`]; the caller performs the fetch without
//! holding the session and hands the result to [`Session::complete`]. Any
//! result whose ticket belongs to an earlier chat selection is dropped, so a
//! slow response can never leak into the chat that replaced it.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, InitialChunk};
use crate::error::{Error, Result};
use crate::models::{ChatManifest, Message, SearchEntry};
use crate::navigate::{DateTarget, Highlight, NavTarget, chunk_for_date};
use crate::pager::{Affordances, LoadKind, Pager, PagerState};
use crate::render::{Feed, RenderOptions, Renderer, Viewport};
use crate::search::{self, MatchCursor, SearchHit, SearchOptions};
use crate::store::MessageStore;

/// Viewport height used until the host reports a real one.
pub const DEFAULT_CLIENT_HEIGHT: f64 = 800.0;

/// Identity of one chat selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    epoch: u64,
    chat_id: String,
}

impl Ticket {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

/// A claimed chunk load, to be fetched by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRequest {
    pub ticket: Ticket,
    /// 1-based chunk index.
    pub index: usize,
    pub filename: String,
    pub kind: LoadKind,
}

impl ChunkRequest {
    pub fn chat_id(&self) -> &str {
        &self.ticket.chat_id
    }
}

/// What `navigate` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Already loaded; scrolled and highlighted.
    Shown,
    /// The owning chunk must be loaded first. The target stays pending and
    /// resolves when the request completes.
    Load(ChunkRequest),
    /// Cannot be reached. The view is left as it was.
    Unresolvable(String),
}

#[derive(Debug)]
pub struct Session {
    epoch: u64,
    chat_id: Option<String>,
    title: Option<String>,
    store: MessageStore,
    pager: Pager,
    renderer: Renderer,
    feed: Feed,
    viewport: Viewport,
    pending: Option<NavTarget>,
    highlight: Option<Highlight>,
    highlight_for: Duration,
    search_opts: SearchOptions,
    search_index: Option<Arc<[SearchEntry]>>,
    cursor: MatchCursor,
    scroll_to_top_on_open: bool,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            epoch: 0,
            chat_id: None,
            title: None,
            store: MessageStore::new(),
            pager: Pager::new(config.pager.initial_chunk),
            renderer: Renderer::new(RenderOptions::from_config(config)),
            feed: Feed::default(),
            viewport: Viewport::new(DEFAULT_CLIENT_HEIGHT),
            pending: None,
            highlight: None,
            highlight_for: config.navigation.highlight(),
            search_opts: SearchOptions {
                min_query_len: config.search.min_query_len,
                limit: config.search.result_limit,
            },
            search_index: None,
            cursor: MatchCursor::default(),
            scroll_to_top_on_open: config.pager.initial_chunk == InitialChunk::First,
        }
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn state(&self) -> &PagerState {
        self.pager.state()
    }

    pub fn manifest(&self) -> Option<&Arc<ChatManifest>> {
        self.pager.manifest()
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Host scroll events and resizes.
    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn affordances(&self) -> Affordances {
        self.pager.affordances(&self.store)
    }

    pub fn pending(&self) -> Option<&NavTarget> {
        self.pending.as_ref()
    }

    pub fn has_search_index(&self) -> bool {
        self.search_index.is_some()
    }

    /// Id of the highlighted message while the highlight lasts.
    pub fn highlighted(&self) -> Option<&str> {
        self.highlight
            .as_ref()
            .filter(|h| h.is_active())
            .map(|h| h.message_id.as_str())
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.epoch == self.epoch && self.chat_id.as_deref() == Some(ticket.chat_id.as_str())
    }

    /// Select a chat. Everything belonging to the previous chat is dropped
    /// before this returns; `target` is resolved once the chat is loaded.
    pub fn select_chat(&mut self, chat_id: &str, target: Option<NavTarget>) -> Ticket {
        self.clear();
        self.epoch += 1;
        self.chat_id = Some(chat_id.to_string());
        self.pending = target;
        self.pager.begin();
        info!(chat = %chat_id, epoch = self.epoch, "selected chat");
        Ticket {
            epoch: self.epoch,
            chat_id: chat_id.to_string(),
        }
    }

    /// Back to the welcome state. Outstanding requests become stale.
    pub fn dispose(&mut self) {
        self.clear();
        self.epoch += 1;
        self.chat_id = None;
        self.pager.reset();
    }

    fn clear(&mut self) {
        self.store.reset();
        self.feed = Feed::default();
        self.viewport = Viewport::new(self.viewport.client_height);
        self.title = None;
        self.pending = None;
        self.highlight = None;
        self.search_index = None;
        self.cursor.clear();
    }

    /// Apply the manifest fetch and plan the initial chunk. A failed
    /// manifest puts the chat in the error state.
    pub fn manifest_loaded(
        &mut self,
        ticket: &Ticket,
        manifest: Result<ChatManifest>,
    ) -> Option<ChunkRequest> {
        if !self.is_current(ticket) {
            warn!(chat = %ticket.chat_id, "discarding manifest for a stale selection");
            return None;
        }
        let manifest = match manifest {
            Ok(manifest) => Arc::new(manifest),
            Err(e) => {
                warn!(chat = %ticket.chat_id, error = %e, "chat manifest unavailable");
                self.pager.fail(e.to_string());
                return None;
            }
        };
        if !manifest.title.is_empty() {
            self.title = Some(manifest.title.clone());
        }
        let target = self
            .pending
            .as_ref()
            .and_then(|t| t.resolve_chunk(&manifest));
        self.pager.set_manifest(manifest);
        let index = self.pager.start_initial(target)?;
        self.request(index, LoadKind::Initial)
    }

    pub fn set_search_index(&mut self, ticket: &Ticket, entries: Option<Vec<SearchEntry>>) {
        if self.is_current(ticket) {
            self.search_index = entries.map(Arc::from);
        }
    }

    pub fn plan_older(&mut self) -> Option<ChunkRequest> {
        let index = self.pager.start_older(&self.store)?;
        self.request(index, LoadKind::Older)
    }

    pub fn plan_newer(&mut self) -> Option<ChunkRequest> {
        let index = self.pager.start_newer(&self.store)?;
        self.request(index, LoadKind::Newer)
    }

    pub fn plan_jump(&mut self, index: usize) -> Option<ChunkRequest> {
        let index = self.pager.start_jump(index, &self.store)?;
        self.request(index, LoadKind::Jump)
    }

    fn request(&mut self, index: usize, kind: LoadKind) -> Option<ChunkRequest> {
        let Some(filename) = self.pager.chunk_info(index).map(|c| c.filename.clone()) else {
            self.pager.finish(index, Err(format!("chunk {index} missing from manifest")));
            return None;
        };
        let chat_id = self.chat_id.clone()?;
        debug!(chat = %chat_id, index, kind = %kind, "planned chunk load");
        Some(ChunkRequest {
            ticket: Ticket {
                epoch: self.epoch,
                chat_id,
            },
            index,
            filename,
            kind,
        })
    }

    /// Apply a fetched chunk. `Ok(false)` means the request was stale and
    /// nothing changed; an error is the load failure, already reflected in
    /// the pager (re-planning the same load retries it).
    pub fn complete(
        &mut self,
        request: &ChunkRequest,
        result: Result<Vec<Message>>,
    ) -> Result<bool> {
        if !self.is_current(&request.ticket) {
            warn!(
                chat = %request.ticket.chat_id,
                index = request.index,
                "discarding chunk for a stale selection"
            );
            return Ok(false);
        }

        let messages = match result {
            Ok(messages) => messages,
            Err(e) => {
                warn!(
                    chat = %request.ticket.chat_id,
                    index = request.index,
                    kind = %request.kind,
                    error = %e,
                    "chunk load failed"
                );
                self.pager.finish(request.index, Err(e.to_string()));
                if request.kind == LoadKind::Jump || request.kind == LoadKind::Initial {
                    self.pending = None;
                }
                return Err(e);
            }
        };

        if !self.pager.finish(request.index, Ok(())) {
            return Ok(false);
        }
        let count = messages.len();
        let below_window = self
            .store
            .window()
            .is_some_and(|(min, _)| request.index < min);
        if !self.store.add_chunk(request.index, messages) {
            return Ok(false);
        }
        debug!(index = request.index, count, "chunk added");

        let anchor = self.viewport.anchor();
        self.rerender();
        match request.kind {
            LoadKind::Older => self.viewport.restore(anchor, self.feed.height()),
            LoadKind::Jump if below_window => self.viewport.restore(anchor, self.feed.height()),
            LoadKind::Initial if self.scroll_to_top_on_open => self.viewport.scroll_to_top(),
            LoadKind::Initial => self.viewport.scroll_to_bottom(),
            LoadKind::Newer | LoadKind::Jump => {}
        }
        self.resolve_pending(request.index);
        Ok(true)
    }

    fn rerender(&mut self) {
        self.feed = self.renderer.render(&self.store.flatten(), &self.store);
        self.viewport.relayout(self.feed.height());
    }

    fn resolve_pending(&mut self, loaded: usize) {
        let Some(target) = self.pending.take() else {
            return;
        };
        if self.reveal(&target.message_id) {
            return;
        }
        let expected = self.manifest().and_then(|m| target.resolve_chunk(m));
        if expected == Some(loaded) {
            warn!(message = %target.message_id, chunk = loaded, "message not found in its chunk");
        } else {
            self.pending = Some(target);
        }
    }

    /// Scroll a loaded message into the centre and highlight it.
    pub fn reveal(&mut self, message_id: &str) -> bool {
        let Some((top, height)) = self.feed.bounds_of(message_id) else {
            return false;
        };
        self.viewport.center_on(top, height);
        self.highlight = Some(Highlight::new(message_id, self.highlight_for));
        true
    }

    /// Bring `target` into view, loading its chunk if needed.
    pub fn navigate(&mut self, target: NavTarget) -> Navigation {
        if self.reveal(&target.message_id) {
            return Navigation::Shown;
        }
        let Some(manifest) = self.manifest() else {
            return Navigation::Unresolvable("no chat loaded".to_string());
        };
        let Some(index) = target.resolve_chunk(manifest) else {
            return Navigation::Unresolvable(
                Error::MessageNotFound(format!("no chunk holds {}", target.message_id)).to_string(),
            );
        };
        if self.store.contains_chunk(index) {
            return Navigation::Unresolvable(format!(
                "{} is not in chunk {index}",
                target.message_id
            ));
        }
        match self.plan_jump(index) {
            Some(request) => {
                self.pending = Some(target);
                Navigation::Load(request)
            }
            None => Navigation::Unresolvable("another load is in progress".to_string()),
        }
    }

    /// First loaded message on or after `date`.
    pub fn first_loaded_on_or_after(&self, date: NaiveDate) -> Option<String> {
        self.store
            .flatten()
            .iter()
            .filter(|m| m.date().is_some_and(|d| d >= date))
            .find_map(|m| m.id().map(str::to_string))
    }

    /// Where `date` lands: the search index when present, else the
    /// manifest's per-chunk date ranges and whatever of that chunk is loaded.
    pub fn locate_date(&self, date: NaiveDate) -> Option<DateTarget> {
        if let Some(entry) = self
            .search_index
            .as_deref()
            .and_then(|index| index.iter().find(|e| e.date().is_some_and(|d| d >= date)))
        {
            return Some(DateTarget::Message(NavTarget::new(entry.id.clone())));
        }
        match self.manifest().and_then(|m| chunk_for_date(m, date)) {
            Some(index) if !self.store.contains_chunk(index) => Some(DateTarget::Chunk(index)),
            _ => self
                .first_loaded_on_or_after(date)
                .map(|id| DateTarget::Message(NavTarget::new(id))),
        }
    }

    /// Run an in-chat search and reset the match cursor to its results.
    pub fn search(&mut self, query: &str) -> Vec<SearchHit> {
        let hits = match &self.search_index {
            Some(index) => search::search_entries(index, query, self.search_opts),
            None => search::search_messages(&self.store.flatten(), query, self.search_opts),
        };
        self.cursor = MatchCursor::new(hits.iter().map(|h| h.message_id.clone()).collect());
        hits
    }

    pub fn cursor(&self) -> &MatchCursor {
        &self.cursor
    }

    pub fn next_match(&mut self) -> Option<String> {
        self.cursor.next().map(str::to_string)
    }

    pub fn prev_match(&mut self) -> Option<String> {
        self.cursor.prev().map(str::to_string)
    }

    pub fn clear_search(&mut self) {
        self.cursor.clear();
    }

    /// HTML of the current feed with the live highlight applied.
    pub fn render_html(&self) -> String {
        self.feed.to_html(self.highlighted())
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
