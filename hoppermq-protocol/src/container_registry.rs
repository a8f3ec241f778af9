//! Container Registry (C5)
//!
//! Owns containers keyed by container `ID` and the shared `TopicIndex`,
//! under a single writer-lock/multi-reader-lock discipline (§4.5, §5: "take
//! the write lock on the registry, which owns the index").

use crate::container::{Container, ContainerEffect};
use crate::topic_index::TopicIndex;
use hoppermq_core::id::Id;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    containers: HashMap<Id, Container>,
    client_to_container: HashMap<Id, Id>,
    topic_index: TopicIndex,
}

pub struct ContainerRegistry {
    inner: RwLock<Inner>,
}

impl ContainerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Allocate a container for `client_id` in state `CREATED` (§4.6 step 1).
    pub fn create(&self, container_id: Id, client_id: Id) {
        let mut inner = self.inner.write();
        inner
            .client_to_container
            .insert(client_id.clone(), container_id.clone());
        inner
            .containers
            .insert(container_id.clone(), Container::new(container_id, client_id));
    }

    /// Look up the container owning `client_id` (used to route control
    /// frames by the peer ID embedded in the payload, §4.6 step 3).
    pub fn container_id_for_client(&self, client_id: &Id) -> Option<Id> {
        self.inner.read().client_to_container.get(client_id).cloned()
    }

    /// Apply a mutation to the container identified by `container_id`,
    /// returning whatever the closure returns. Takes the write lock because
    /// a subscribe/unsubscribe inside `f` may also need to update the
    /// shared topic index (done by the caller via the returned effects).
    pub fn with_container_mut<R>(
        &self,
        container_id: &Id,
        f: impl FnOnce(&mut Container) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.write();
        inner.containers.get_mut(container_id).map(f)
    }

    /// Apply the effects a `Container::handle` call returned, updating the
    /// shared topic index to match (§4.5 topic index contract).
    pub fn apply_effects(&self, container_id: &Id, effects: &[ContainerEffect]) {
        let mut inner = self.inner.write();
        for effect in effects {
            match effect {
                ContainerEffect::TopicSubscribed { topic } => {
                    inner.topic_index.subscribe(topic, container_id.clone());
                }
                ContainerEffect::TopicUnsubscribed { topic } => {
                    inner.topic_index.unsubscribe(topic, container_id);
                }
                ContainerEffect::CloseRequested => {}
            }
        }
    }

    /// Exact-match subscriber lookup for a published topic (§4.6 step 4).
    #[must_use]
    pub fn subscribers(&self, topic: &str) -> Vec<Id> {
        self.inner.read().topic_index.subscribers(topic)
    }

    /// Tear down the container for `client_id`: remove it from the topic
    /// index for every topic it held, and drop the container record
    /// (§4.6 "On PeerDisconnected").
    pub fn remove_by_client(&self, client_id: &Id) {
        let mut inner = self.inner.write();
        let Some(container_id) = inner.client_to_container.remove(client_id) else {
            return;
        };
        inner.topic_index.remove_container_everywhere(&container_id);
        inner.containers.remove(&container_id);
    }

    #[must_use]
    pub fn client_id_for_container(&self, container_id: &Id) -> Option<Id> {
        self.inner
            .read()
            .containers
            .get(container_id)
            .map(|c| c.client_id.clone())
    }
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerState;

    #[test]
    fn subscribe_effect_updates_topic_index_through_registry() {
        let registry = ContainerRegistry::new();
        registry.create(Id::from("K1"), Id::from("P1"));

        let container_id = registry.container_id_for_client(&Id::from("P1")).unwrap();
        registry.with_container_mut(&container_id, |c| c.state = ContainerState::Connected);

        let effects = registry
            .with_container_mut(&container_id, |c| {
                c.handle(
                    &crate::codec::Frame::Subscribe {
                        topic: "news".into(),
                        qos: 0,
                        routing_key: String::new(),
                    },
                    &hoppermq_core::id::UuidGenerator,
                    |_| {},
                )
            })
            .unwrap();
        registry.apply_effects(&container_id, &effects);

        assert_eq!(registry.subscribers("news"), vec![container_id]);
    }

    #[test]
    fn disconnect_removes_container_from_every_topic() {
        let registry = ContainerRegistry::new();
        registry.create(Id::from("K1"), Id::from("P1"));
        let container_id = registry.container_id_for_client(&Id::from("P1")).unwrap();
        registry.apply_effects(
            &container_id,
            &[ContainerEffect::TopicSubscribed { topic: "news".into() }],
        );

        registry.remove_by_client(&Id::from("P1"));

        assert!(registry.subscribers("news").is_empty());
        assert!(registry.container_id_for_client(&Id::from("P1")).is_none());
    }
}
