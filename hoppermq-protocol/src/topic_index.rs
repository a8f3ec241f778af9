//! Topic Index: inverted index mapping topic to the set of subscribed
//! container `ID`s.
//!
//! Grounded in `monocoque-core`'s `SubscriptionIndex`
//! (`monocoque-core/src/pubsub/index.rs`) for its invariant-maintenance
//! shape (subscribe/unsubscribe/remove-everywhere, empty-set cleanup), but
//! deliberately deviates from it on the matching algorithm: ZMQ `SUB`
//! sockets match by *prefix*, while HPMQ's `Subscribe{topic}` is an exact
//! topic string (§3 "TopicIndex"), so this index is a plain
//! `HashMap<String, HashSet<ID>>` rather than a sorted-prefix table.

use hoppermq_core::id::Id;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct TopicIndex {
    topics: HashMap<String, HashSet<Id>>,
}

impl TopicIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: HashMap::new(),
        }
    }

    /// Add `container_id` to the subscriber set for `topic`.
    pub fn subscribe(&mut self, topic: &str, container_id: Id) {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(container_id);
    }

    /// Remove `container_id` from `topic`'s subscriber set. Drops the key
    /// if the set becomes empty.
    pub fn unsubscribe(&mut self, topic: &str, container_id: &Id) {
        if let Some(set) = self.topics.get_mut(topic) {
            set.remove(container_id);
            if set.is_empty() {
                self.topics.remove(topic);
            }
        }
    }

    /// Remove `container_id` from every topic (used on container
    /// destruction).
    pub fn remove_container_everywhere(&mut self, container_id: &Id) {
        self.topics.retain(|_, set| {
            set.remove(container_id);
            !set.is_empty()
        });
    }

    /// Exact-match lookup: container IDs subscribed to `topic`.
    #[must_use]
    pub fn subscribers(&self, topic: &str) -> Vec<Id> {
        self.topics
            .get(topic)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, topic: &str, container_id: &Id) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|set| set.contains(container_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_does_not_match_prefixes() {
        let mut idx = TopicIndex::new();
        idx.subscribe("news", Id::from("K1"));
        idx.subscribe("newsletter", Id::from("K2"));

        assert_eq!(idx.subscribers("news"), vec![Id::from("K1")]);
        assert_eq!(idx.subscribers("newsletter"), vec![Id::from("K2")]);
    }

    #[test]
    fn unsubscribe_drops_empty_topic() {
        let mut idx = TopicIndex::new();
        idx.subscribe("news", Id::from("K1"));
        idx.unsubscribe("news", &Id::from("K1"));

        assert!(idx.subscribers("news").is_empty());
        assert!(!idx.topics.contains_key("news"));
    }

    #[test]
    fn remove_container_everywhere_cleans_all_topics() {
        let mut idx = TopicIndex::new();
        idx.subscribe("news", Id::from("K1"));
        idx.subscribe("sports", Id::from("K1"));
        idx.subscribe("sports", Id::from("K2"));

        idx.remove_container_everywhere(&Id::from("K1"));

        assert!(idx.subscribers("news").is_empty());
        assert_eq!(idx.subscribers("sports"), vec![Id::from("K2")]);
    }

    #[test]
    fn duplicate_subscribe_is_idempotent() {
        let mut idx = TopicIndex::new();
        idx.subscribe("news", Id::from("K1"));
        idx.subscribe("news", Id::from("K1"));
        assert_eq!(idx.subscribers("news").len(), 1);
    }
}
