//! In-memory message store for the active chat.
//!
//! Chunks may arrive in any order (a deep link loads a middle chunk first),
//! but chunks are chronological internally and across their 1-based index,
//! so ordering by index is enough to rebuild the full timeline.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use crate::models::Message;

#[derive(Debug, Default)]
pub struct MessageStore {
    chunks: BTreeMap<usize, Vec<Arc<Message>>>,
    by_id: HashMap<String, (usize, Arc<Message>)>,
    flattened: OnceLock<Arc<[Arc<Message>]>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every chunk, the id index and the cached log.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.by_id.clear();
        self.flattened = OnceLock::new();
    }

    /// Store a fetched chunk. Returns `false` (and changes nothing) when the
    /// chunk index is already present.
    pub fn add_chunk(&mut self, index: usize, messages: Vec<Message>) -> bool {
        if self.chunks.contains_key(&index) {
            return false;
        }
        let messages: Vec<Arc<Message>> = messages.into_iter().map(Arc::new).collect();
        for message in &messages {
            if let Some(id) = message.id() {
                self.by_id
                    .insert(id.to_string(), (index, Arc::clone(message)));
            }
        }
        self.chunks.insert(index, messages);
        self.flattened = OnceLock::new();
        true
    }

    /// All loaded messages in chronological order.
    pub fn flatten(&self) -> Arc<[Arc<Message>]> {
        Arc::clone(self.flattened.get_or_init(|| {
            self.chunks
                .values()
                .flat_map(|chunk| chunk.iter().cloned())
                .collect()
        }))
    }

    pub fn lookup(&self, message_id: &str) -> Option<&Message> {
        self.by_id.get(message_id).map(|(_, m)| m.as_ref())
    }

    /// Index of the chunk a loaded message came from.
    pub fn chunk_of(&self, message_id: &str) -> Option<usize> {
        self.by_id.get(message_id).map(|(index, _)| *index)
    }

    pub fn contains_chunk(&self, index: usize) -> bool {
        self.chunks.contains_key(&index)
    }

    /// `(min, max)` loaded chunk indices. Chunks in between may be missing.
    pub fn window(&self) -> Option<(usize, usize)> {
        let min = *self.chunks.keys().next()?;
        let max = *self.chunks.keys().next_back()?;
        Some((min, max))
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of loaded messages.
    pub fn len(&self) -> usize {
        self.chunks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserMessage;
    use proptest::prelude::*;

    fn msg(id: usize) -> Message {
        Message::User(UserMessage {
            id: Some(format!("message{id}")),
            plain_text: Some(format!("text {id}")),
            ..UserMessage::default()
        })
    }

    fn chunk(index: usize, size: usize) -> Vec<Message> {
        let start = (index - 1) * size + 1;
        (start..start + size).map(msg).collect()
    }

    fn ids(store: &MessageStore) -> Vec<String> {
        store
            .flatten()
            .iter()
            .filter_map(|m| m.id().map(str::to_string))
            .collect()
    }

    #[test]
    fn flatten_orders_by_chunk_index() {
        let mut store = MessageStore::new();
        store.add_chunk(3, chunk(3, 2));
        store.add_chunk(1, chunk(1, 2));

        assert_eq!(
            ids(&store),
            vec!["message1", "message2", "message5", "message6"]
        );
        assert_eq!(store.window(), Some((1, 3)));
        assert!(!store.contains_chunk(2));
    }

    #[test]
    fn add_chunk_twice_is_noop() {
        let mut store = MessageStore::new();
        assert!(store.add_chunk(2, chunk(2, 3)));
        let before = ids(&store);

        assert!(!store.add_chunk(2, vec![msg(99)]));

        assert_eq!(ids(&store), before);
        assert_eq!(store.len(), 3);
        assert!(store.lookup("message99").is_none());
    }

    #[test]
    fn lookup_and_chunk_of() {
        let mut store = MessageStore::new();
        store.add_chunk(2, chunk(2, 3));

        assert!(store.lookup("message4").is_some());
        assert_eq!(store.chunk_of("message4"), Some(2));
        assert!(store.lookup("message1").is_none());
    }

    #[test]
    fn messages_without_id_are_kept_but_not_indexed() {
        let mut store = MessageStore::new();
        store.add_chunk(
            1,
            vec![Message::User(UserMessage {
                plain_text: Some("anonymous".to_string()),
                ..UserMessage::default()
            })],
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.flatten().len(), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let mut store = MessageStore::new();
        store.add_chunk(1, chunk(1, 2));
        let _ = store.flatten();

        store.reset();

        assert!(store.is_empty());
        assert_eq!(store.window(), None);
        assert!(store.lookup("message1").is_none());
        assert!(store.flatten().is_empty());
    }

    #[test]
    fn cache_invalidated_on_insert() {
        let mut store = MessageStore::new();
        store.add_chunk(2, chunk(2, 1));
        assert_eq!(store.flatten().len(), 1);
        store.add_chunk(1, chunk(1, 1));
        assert_eq!(ids(&store), vec!["message1", "message2"]);
    }

    proptest! {
        #[test]
        fn flatten_is_chronological_for_any_load_order(
            order in Just((1usize..=6).collect::<Vec<_>>()).prop_shuffle(),
            take in 1usize..=6,
        ) {
            let mut store = MessageStore::new();
            for &index in order.iter().take(take) {
                store.add_chunk(index, chunk(index, 3));
                // re-adding a loaded chunk never changes the log
                store.add_chunk(index, chunk(index, 3));
            }

            let ordinals: Vec<usize> = ids(&store)
                .iter()
                .filter_map(|id| id.trim_start_matches("message").parse().ok())
                .collect();
            prop_assert_eq!(ordinals.len(), take * 3);
            prop_assert!(ordinals.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
