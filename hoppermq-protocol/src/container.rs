//! Container Registry & State Machine (C5)
//!
//! Sans-IO session state machine, grounded in `monocoque-zmtp/src/session.rs`'s
//! `ZmtpSession`: protocol logic that takes typed
//! frames in and emits typed frames out through a callback, decoupled from
//! the actual socket. Here the handshake/greeting exchange is HPMQ's
//! `Open`/`Connect`/`Begin` sequence instead of ZMTP's greeting.

use crate::codec::Frame;
use hoppermq_core::id::Id;
use std::collections::HashMap;

/// §4.5 state diagram. Only `CREATED → OPEN_SENT → CONNECTED` and teardown
/// are on the required path; `OpenRcvd`/`Reserved`/`Idle` are reachable but
/// not load-bearing (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    OpenSent,
    OpenRcvd,
    Connected,
    Reserved,
    Idle,
    Destroyed,
}

/// Protocol error code used for "frame arrived in a state that doesn't
/// accept it" (§4.5, §7 `INVALID_STATE`).
pub const ERROR_CODE_PROTOCOL: u16 = 1;

pub const DEFAULT_INCOMING_WINDOW: u32 = 1000;
pub const DEFAULT_OUTGOING_WINDOW: u32 = 1000;

/// A per-(container, topic) subscription cursor (§3 `Channel`). Immutable
/// after creation; removed as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: Id,
    pub topic: String,
    pub routing_key: String,
}

/// Side effects a caller (the broker router) must apply to shared state
/// (the topic index) after `Container::handle` returns. The container
/// itself only owns its local channel bookkeeping; the global topic index
/// is owned by the container registry (§5: "both guarded together when a
/// subscribe modifies both").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEffect {
    TopicSubscribed { topic: String },
    TopicUnsubscribed { topic: String },
    CloseRequested,
}

/// The session object: one per peer for the duration of that peer's
/// session (§3 `Container`).
#[derive(Debug)]
pub struct Container {
    pub id: Id,
    pub client_id: Id,
    pub state: ContainerState,
    /// Invariant: `channelsByTopic[t] == c.ID ⇔ c ∈ Channels ∧ c.topic == t`,
    /// maintained here by keying directly on topic.
    channels: HashMap<String, Channel>,
}

impl Container {
    #[must_use]
    pub fn new(id: Id, client_id: Id) -> Self {
        Self {
            id,
            client_id,
            state: ContainerState::Created,
            channels: HashMap::new(),
        }
    }

    #[must_use]
    pub fn channel(&self, topic: &str) -> Option<&Channel> {
        self.channels.get(topic)
    }

    #[must_use]
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Dispatch a control-range frame per the current state (§4.5).
    ///
    /// `Message` frames are not passed here: the router fans those out via
    /// the topic index directly (§4.6). `send` is called zero or more
    /// times with frames to deliver back to this container's peer.
    pub fn handle(
        &mut self,
        frame: &Frame,
        id_gen: &dyn hoppermq_core::id::IdGenerator,
        mut send: impl FnMut(Frame),
    ) -> Vec<ContainerEffect> {
        // Close is accepted in every state and initiates teardown (§4.5).
        if matches!(frame, Frame::Close { .. }) {
            self.state = ContainerState::Destroyed;
            return vec![ContainerEffect::CloseRequested];
        }

        match self.state {
            ContainerState::OpenSent => self.handle_open_sent(frame, &mut send),
            ContainerState::Connected => self.handle_connected(frame, id_gen, &mut send),
            _ => {
                self.reject_invalid_state(frame, &mut send);
                Vec::new()
            }
        }
    }

    fn handle_open_sent(&mut self, frame: &Frame, send: &mut impl FnMut(Frame)) -> Vec<ContainerEffect> {
        match frame {
            Frame::OpenRcvd { .. } => {
                self.state = ContainerState::OpenRcvd;
                Vec::new()
            }
            Frame::Connect { source_id, .. } => {
                self.state = ContainerState::Connected;
                send(Frame::Begin {
                    source_id: source_id.clone(),
                    container_id: self.id.clone(),
                    remote_channel: 0,
                    next_outgoing_id: 0,
                    incoming_window: DEFAULT_INCOMING_WINDOW,
                    outgoing_window: DEFAULT_OUTGOING_WINDOW,
                });
                Vec::new()
            }
            other => {
                self.reject_invalid_state(other, send);
                Vec::new()
            }
        }
    }

    fn handle_connected(
        &mut self,
        frame: &Frame,
        id_gen: &dyn hoppermq_core::id::IdGenerator,
        send: &mut impl FnMut(Frame),
    ) -> Vec<ContainerEffect> {
        match frame {
            Frame::Subscribe { topic, routing_key, .. } => {
                // Idempotent by topic: a duplicate Subscribe is a no-op and
                // must not allocate a new channel ID (§4.5).
                if self.channels.contains_key(topic) {
                    return Vec::new();
                }
                self.channels.insert(
                    topic.clone(),
                    Channel {
                        id: id_gen.generate(),
                        topic: topic.clone(),
                        routing_key: routing_key.clone(),
                    },
                );
                vec![ContainerEffect::TopicSubscribed {
                    topic: topic.clone(),
                }]
            }
            Frame::Unsubscribe { topic } => {
                if self.channels.remove(topic).is_some() {
                    vec![ContainerEffect::TopicUnsubscribed {
                        topic: topic.clone(),
                    }]
                } else {
                    Vec::new()
                }
            }
            other => {
                self.reject_invalid_state(other, send);
                Vec::new()
            }
        }
    }

    fn reject_invalid_state(&self, frame: &Frame, send: &mut impl FnMut(Frame)) {
        tracing::warn!(
            container_id = %self.id,
            state = ?self.state,
            frame_type = ?frame.frame_type(),
            "frame rejected: invalid state for frame"
        );
        send(Frame::Error {
            error_code: ERROR_CODE_PROTOCOL,
            error_message: "invalid state for frame".into(),
            details: HashMap::new(),
        });
    }

    /// Effects to apply when this container's peer disconnects: remove it
    /// from the topic index for every subscribed topic (§4.6).
    pub fn teardown_effects(&self) -> Vec<ContainerEffect> {
        self.topics()
            .map(|t| ContainerEffect::TopicUnsubscribed { topic: t.to_string() })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoppermq_core::id::UuidGenerator;

    #[test]
    fn connect_transitions_open_sent_to_connected_and_replies_begin() {
        let mut c = Container::new(Id::from("K1"), Id::from("P1"));
        c.state = ContainerState::OpenSent;
        let gen = UuidGenerator;

        let mut sent = Vec::new();
        let effects = c.handle(
            &Frame::Connect {
                source_id: Id::from("P1"),
                client_version: "1.0.0".into(),
                keep_alive: 30,
            },
            &gen,
            |f| sent.push(f),
        );

        assert_eq!(c.state, ContainerState::Connected);
        assert!(effects.is_empty());
        assert_eq!(
            sent,
            vec![Frame::Begin {
                source_id: Id::from("P1"),
                container_id: Id::from("K1"),
                remote_channel: 0,
                next_outgoing_id: 0,
                incoming_window: DEFAULT_INCOMING_WINDOW,
                outgoing_window: DEFAULT_OUTGOING_WINDOW,
            }]
        );
    }

    #[test]
    fn duplicate_subscribe_does_not_allocate_a_new_channel() {
        let mut c = Container::new(Id::from("K1"), Id::from("P1"));
        c.state = ContainerState::Connected;
        let gen = UuidGenerator;

        let mut sent = Vec::new();
        let e1 = c.handle(
            &Frame::Subscribe {
                topic: "t1".into(),
                qos: 0,
                routing_key: String::new(),
            },
            &gen,
            |f| sent.push(f),
        );
        let id_after_first = c.channel("t1").unwrap().id.clone();

        let e2 = c.handle(
            &Frame::Subscribe {
                topic: "t1".into(),
                qos: 0,
                routing_key: String::new(),
            },
            &gen,
            |f| sent.push(f),
        );

        assert_eq!(e1, vec![ContainerEffect::TopicSubscribed { topic: "t1".into() }]);
        assert!(e2.is_empty());
        assert_eq!(c.channel("t1").unwrap().id, id_after_first);
    }

    #[test]
    fn frame_in_wrong_state_gets_protocol_error_reply() {
        let mut c = Container::new(Id::from("K1"), Id::from("P1"));
        c.state = ContainerState::OpenSent;
        let gen = UuidGenerator;

        let mut sent = Vec::new();
        c.handle(
            &Frame::Subscribe {
                topic: "t1".into(),
                qos: 0,
                routing_key: String::new(),
            },
            &gen,
            |f| sent.push(f),
        );

        assert!(matches!(sent.as_slice(), [Frame::Error { error_code: ERROR_CODE_PROTOCOL, .. }]));
    }

    #[test]
    fn close_is_accepted_in_any_state() {
        let mut c = Container::new(Id::from("K1"), Id::from("P1"));
        c.state = ContainerState::Connected;
        let gen = UuidGenerator;

        let effects = c.handle(
            &Frame::Close {
                reason: "bye".into(),
                code: 0,
            },
            &gen,
            |_| {},
        );

        assert_eq!(c.state, ContainerState::Destroyed);
        assert_eq!(effects, vec![ContainerEffect::CloseRequested]);
    }
}
