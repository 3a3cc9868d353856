//! Chunk pagination state machine for the active chat.
//!
//! `Idle → Loading → Ready ⇄ LoadingMore → Ready`, with `Error` terminal for
//! the current chat. At most one chunk load is in flight; triggers that
//! arrive while one is pending are ignored. The pager only decides *which*
//! chunk to load; the session owns the store and issues the fetch.

use std::sync::Arc;

use serde::Serialize;

use crate::config::InitialChunk;
use crate::models::{ChatManifest, ChunkInfo};
use crate::store::MessageStore;

/// Why a chunk is being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadKind {
    /// First chunk after selecting a chat.
    Initial,
    /// `min − 1`.
    Older,
    /// `max + 1`.
    Newer,
    /// Random access, used by navigation. May leave a gap in the window.
    Jump,
}

impl std::fmt::Display for LoadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadKind::Initial => write!(f, "initial"),
            LoadKind::Older => write!(f, "older"),
            LoadKind::Newer => write!(f, "newer"),
            LoadKind::Jump => write!(f, "jump"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagerState {
    /// No chat selected.
    Idle,
    /// Chat selected; manifest or first chunk pending.
    Loading,
    Ready,
    LoadingMore(LoadKind),
    /// Manifest or initial chunk failed; the chat must be re-selected.
    Error(String),
}

/// What a "load older/newer" control should show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum Affordance {
    /// At the boundary, or nothing loaded.
    Hidden,
    Available,
    Loading,
    /// Last attempt failed; invoking the load again retries it.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Affordances {
    pub older: Affordance,
    pub newer: Affordance,
}

#[derive(Debug)]
pub struct Pager {
    state: PagerState,
    policy: InitialChunk,
    manifest: Option<Arc<ChatManifest>>,
    in_flight: Option<(usize, LoadKind)>,
    last_failure: Option<(LoadKind, String)>,
}

impl Pager {
    pub fn new(policy: InitialChunk) -> Self {
        Self {
            state: PagerState::Idle,
            policy,
            manifest: None,
            in_flight: None,
            last_failure: None,
        }
    }

    pub fn state(&self) -> &PagerState {
        &self.state
    }

    pub fn manifest(&self) -> Option<&Arc<ChatManifest>> {
        self.manifest.as_ref()
    }

    pub fn in_flight(&self) -> Option<(usize, LoadKind)> {
        self.in_flight
    }

    pub fn is_ready(&self) -> bool {
        self.state == PagerState::Ready
    }

    /// Back to `Idle` (chat closed).
    pub fn reset(&mut self) {
        self.state = PagerState::Idle;
        self.manifest = None;
        self.in_flight = None;
        self.last_failure = None;
    }

    /// A chat was selected: forget everything and wait for its manifest.
    pub fn begin(&mut self) {
        self.reset();
        self.state = PagerState::Loading;
    }

    pub fn set_manifest(&mut self, manifest: Arc<ChatManifest>) {
        if self.state == PagerState::Loading {
            self.manifest = Some(manifest);
        }
    }

    /// Enter the terminal error state for this chat.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.in_flight = None;
        self.state = PagerState::Error(reason.into());
    }

    pub fn chunk_total(&self) -> usize {
        self.manifest.as_ref().map_or(0, |m| m.chunk_total())
    }

    pub fn chunk_info(&self, index: usize) -> Option<&ChunkInfo> {
        self.manifest.as_ref().and_then(|m| m.chunk(index))
    }

    /// Chunk to open first: the navigation target's chunk when one is known
    /// and valid, otherwise the configured end of the archive.
    pub fn initial_chunk(&self, target: Option<usize>) -> Option<usize> {
        let total = self.chunk_total();
        if total == 0 {
            return None;
        }
        if let Some(index) = target.filter(|i| (1..=total).contains(i)) {
            return Some(index);
        }
        Some(match self.policy {
            InitialChunk::Last => total,
            InitialChunk::First => 1,
        })
    }

    /// Claim the initial load. An empty chat goes straight to `Ready`.
    pub fn start_initial(&mut self, target: Option<usize>) -> Option<usize> {
        if self.state != PagerState::Loading || self.in_flight.is_some() {
            return None;
        }
        let Some(index) = self.initial_chunk(target) else {
            if self.manifest.is_some() {
                self.state = PagerState::Ready;
            }
            return None;
        };
        self.in_flight = Some((index, LoadKind::Initial));
        Some(index)
    }

    /// Claim the next older chunk. `None` when not `Ready`, nothing is
    /// loaded, or the oldest chunk is already loaded.
    pub fn start_older(&mut self, store: &MessageStore) -> Option<usize> {
        let (min, _) = store.window()?;
        if min <= 1 {
            return None;
        }
        self.start(min - 1, LoadKind::Older, store)
    }

    /// Claim the next newer chunk.
    pub fn start_newer(&mut self, store: &MessageStore) -> Option<usize> {
        let (_, max) = store.window()?;
        if max >= self.chunk_total() {
            return None;
        }
        self.start(max + 1, LoadKind::Newer, store)
    }

    /// Claim an arbitrary chunk for navigation.
    pub fn start_jump(&mut self, index: usize, store: &MessageStore) -> Option<usize> {
        if !(1..=self.chunk_total()).contains(&index) {
            return None;
        }
        self.start(index, LoadKind::Jump, store)
    }

    fn start(&mut self, index: usize, kind: LoadKind, store: &MessageStore) -> Option<usize> {
        if self.state != PagerState::Ready || store.contains_chunk(index) {
            return None;
        }
        self.state = PagerState::LoadingMore(kind);
        self.in_flight = Some((index, kind));
        Some(index)
    }

    /// Settle the in-flight load. Results for anything other than the
    /// in-flight chunk are ignored.
    pub fn finish(&mut self, index: usize, outcome: std::result::Result<(), String>) -> bool {
        let Some((expected, kind)) = self.in_flight else {
            return false;
        };
        if expected != index {
            return false;
        }
        self.in_flight = None;
        match (kind, outcome) {
            (LoadKind::Initial, Ok(())) => {
                self.last_failure = None;
                self.state = PagerState::Ready;
            }
            (LoadKind::Initial, Err(reason)) => {
                self.state = PagerState::Error(reason);
            }
            (_, Ok(())) => {
                self.last_failure = None;
                self.state = PagerState::Ready;
            }
            (kind, Err(reason)) => {
                self.last_failure = Some((kind, reason));
                self.state = PagerState::Ready;
            }
        }
        true
    }

    pub fn affordances(&self, store: &MessageStore) -> Affordances {
        let Some((min, max)) = store.window() else {
            return Affordances {
                older: Affordance::Hidden,
                newer: Affordance::Hidden,
            };
        };
        Affordances {
            older: self.affordance(LoadKind::Older, min > 1),
            newer: self.affordance(LoadKind::Newer, max < self.chunk_total()),
        }
    }

    fn affordance(&self, kind: LoadKind, has_more: bool) -> Affordance {
        if !has_more {
            return Affordance::Hidden;
        }
        match &self.state {
            PagerState::LoadingMore(k) if *k == kind => Affordance::Loading,
            PagerState::Ready | PagerState::LoadingMore(_) => match &self.last_failure {
                Some((k, reason)) if *k == kind => Affordance::Failed(reason.clone()),
                _ => Affordance::Available,
            },
            _ => Affordance::Hidden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkInfo;

    fn manifest(chunks: usize) -> Arc<ChatManifest> {
        Arc::new(ChatManifest {
            chat_id: Some("chat_001".to_string()),
            title: "Team".to_string(),
            message_count: 0,
            chunk_count: chunks,
            chunks: (1..=chunks)
                .map(|i| ChunkInfo {
                    filename: format!("chunk_{i:04}.json"),
                    start_id: None,
                    end_id: None,
                    message_count: None,
                    start_date: None,
                    end_date: None,
                })
                .collect(),
            start_date: None,
            end_date: None,
            search_file: None,
        })
    }

    fn ready_pager(chunks: usize, store: &mut MessageStore) -> Pager {
        let mut pager = Pager::new(InitialChunk::Last);
        pager.begin();
        pager.set_manifest(manifest(chunks));
        let index = pager.start_initial(None).expect("initial");
        store.add_chunk(index, Vec::new());
        assert!(pager.finish(index, Ok(())));
        pager
    }

    #[test]
    fn initial_policy_last_or_first() {
        let mut pager = Pager::new(InitialChunk::Last);
        pager.begin();
        pager.set_manifest(manifest(3));
        assert_eq!(pager.initial_chunk(None), Some(3));
        assert_eq!(pager.initial_chunk(Some(2)), Some(2));
        assert_eq!(pager.initial_chunk(Some(7)), Some(3));

        let mut first = Pager::new(InitialChunk::First);
        first.begin();
        first.set_manifest(manifest(3));
        assert_eq!(first.initial_chunk(None), Some(1));
    }

    #[test]
    fn empty_chat_becomes_ready_without_load() {
        let mut pager = Pager::new(InitialChunk::Last);
        pager.begin();
        pager.set_manifest(manifest(0));
        assert_eq!(pager.start_initial(None), None);
        assert!(pager.is_ready());
    }

    #[test]
    fn older_walks_down_to_boundary() {
        let mut store = MessageStore::new();
        let mut pager = ready_pager(3, &mut store);

        for expected in [2, 1] {
            let index = pager.start_older(&store).expect("older");
            assert_eq!(index, expected);
            store.add_chunk(index, Vec::new());
            pager.finish(index, Ok(()));
        }

        assert_eq!(store.window(), Some((1, 3)));
        assert_eq!(pager.start_older(&store), None);
        assert_eq!(pager.state(), &PagerState::Ready);
        assert_eq!(pager.affordances(&store).older, Affordance::Hidden);
    }

    #[test]
    fn newer_at_boundary_is_noop() {
        let mut store = MessageStore::new();
        let mut pager = ready_pager(3, &mut store);
        assert_eq!(pager.start_newer(&store), None);
        assert_eq!(pager.affordances(&store).newer, Affordance::Hidden);
        assert_eq!(pager.affordances(&store).older, Affordance::Available);
    }

    #[test]
    fn second_trigger_while_loading_is_ignored() {
        let mut store = MessageStore::new();
        let mut pager = ready_pager(3, &mut store);

        assert_eq!(pager.start_older(&store), Some(2));
        assert_eq!(pager.start_older(&store), None);
        assert_eq!(pager.start_jump(1, &store), None);
        assert_eq!(pager.affordances(&store).older, Affordance::Loading);
    }

    #[test]
    fn failed_load_more_is_retryable() {
        let mut store = MessageStore::new();
        let mut pager = ready_pager(3, &mut store);

        let index = pager.start_older(&store).expect("older");
        pager.finish(index, Err("HTTP 500".to_string()));

        assert!(pager.is_ready());
        assert_eq!(
            pager.affordances(&store).older,
            Affordance::Failed("HTTP 500".to_string())
        );
        assert_eq!(pager.start_older(&store), Some(index));
    }

    #[test]
    fn failed_initial_load_is_terminal() {
        let mut pager = Pager::new(InitialChunk::Last);
        pager.begin();
        pager.set_manifest(manifest(2));
        let index = pager.start_initial(None).expect("initial");
        pager.finish(index, Err("missing".to_string()));
        assert_eq!(pager.state(), &PagerState::Error("missing".to_string()));
        assert_eq!(pager.start_older(&MessageStore::new()), None);
    }

    #[test]
    fn jump_extends_window_with_gap() {
        let mut store = MessageStore::new();
        let mut pager = ready_pager(5, &mut store);

        let index = pager.start_jump(2, &store).expect("jump");
        store.add_chunk(index, Vec::new());
        pager.finish(index, Ok(()));

        assert_eq!(store.window(), Some((2, 5)));
        assert!(!store.contains_chunk(3));
        // load older continues from the new minimum
        assert_eq!(pager.start_older(&store), Some(1));
    }

    #[test]
    fn finish_for_other_chunk_is_ignored() {
        let mut store = MessageStore::new();
        let mut pager = ready_pager(3, &mut store);
        pager.start_older(&store);
        assert!(!pager.finish(1, Ok(())));
        assert_eq!(pager.state(), &PagerState::LoadingMore(LoadKind::Older));
    }
}
