//! Broker Router (C6)
//!
//! Drives the handshake and steady-state dispatch for every connected peer.
//! Subscribes to the event bus (`PeerConnected`, `FrameBytesReceived`,
//! `PeerDisconnected`) and replies by publishing `SendFrame` events, never
//! touching a socket directly. Grounded in `monocoque-core/src/router.rs`'s
//! `RouterHub`, whose event-loop-over-a-channel shape
//! this keeps, generalized from ZMTP command routing to HPMQ's
//! open/connect/subscribe/publish sequence.

use crate::codec::{self, Frame, FrameClass};
use crate::container_registry::ContainerRegistry;
use hoppermq_core::bus::{BrokerEvent, EventBus, EventKind};
use hoppermq_core::cancellation::CancellationToken;
use hoppermq_core::client_registry::ClientRegistry;
use hoppermq_core::id::IdGenerator;

use futures::FutureExt;
use std::sync::Arc;

/// Whether publishing to a topic with no prior `Subscribe` creates an
/// implicit channel entry (default `false`: a publish to
/// an unknown topic simply fans out to zero subscribers).
#[derive(Debug, Clone, Copy)]
pub struct RouterOptions {
    pub auto_create_channel_on_publish: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            auto_create_channel_on_publish: false,
        }
    }
}

pub struct Router {
    bus: Arc<EventBus>,
    clients: Arc<ClientRegistry>,
    containers: Arc<ContainerRegistry>,
    id_gen: Arc<dyn IdGenerator>,
    options: RouterOptions,
}

impl Router {
    #[must_use]
    pub fn new(
        bus: Arc<EventBus>,
        clients: Arc<ClientRegistry>,
        containers: Arc<ContainerRegistry>,
        id_gen: Arc<dyn IdGenerator>,
        options: RouterOptions,
    ) -> Self {
        Self {
            bus,
            clients,
            containers,
            id_gen,
            options,
        }
    }

    /// Runs until `token` is cancelled. Intended to be spawned as its own
    /// task by the broker (§6 "Service").
    pub async fn run(&self, token: CancellationToken) {
        use futures::select;

        let connected = self.bus.subscribe(EventKind::PeerConnected);
        let received = self.bus.subscribe(EventKind::FrameBytesReceived);
        let disconnected = self.bus.subscribe(EventKind::PeerDisconnected);

        loop {
            select! {
                _ = token.cancelled().fuse() => return,
                ev = connected.recv_async().fuse() => {
                    match ev {
                        Ok(BrokerEvent::PeerConnected { conn, .. }) => self.on_connected(&conn, &token),
                        Ok(_) | Err(_) => {}
                    }
                }
                ev = received.recv_async().fuse() => {
                    match ev {
                        Ok(BrokerEvent::FrameBytesReceived { conn, bytes }) => {
                            self.on_frame_bytes(&conn, &bytes, &token);
                        }
                        Ok(_) | Err(_) => {}
                    }
                }
                ev = disconnected.recv_async().fuse() => {
                    match ev {
                        Ok(BrokerEvent::PeerDisconnected { conn, .. }) => self.on_disconnected(&conn),
                        Ok(_) | Err(_) => {}
                    }
                }
            }
        }
    }

    /// §4.6 step 1: allocate a peer and a container in `CREATED`, then send
    /// `Open` and move the container to `OPEN_SENT`.
    fn on_connected(&self, conn: &Arc<dyn hoppermq_core::conn::Connection>, token: &CancellationToken) {
        let peer = self.clients.on_new(conn.clone());
        let container_id = self.id_gen.generate();
        self.containers.create(container_id.clone(), peer.id.clone());
        peer.set_container_id(container_id.clone());

        self.containers.with_container_mut(&container_id, |c| {
            c.state = crate::container::ContainerState::OpenSent;
        });

        let open = Frame::Open {
            source_id: peer.id.clone(),
            assigned_container_id: container_id,
        };
        self.send_frame(conn, &open, token);
    }

    /// §4.6 steps 2-5: decode one or more frames out of `bytes` and dispatch
    /// each by its range class.
    fn on_frame_bytes(
        &self,
        conn: &Arc<dyn hoppermq_core::conn::Connection>,
        bytes: &[u8],
        token: &CancellationToken,
    ) {
        let frame = match codec::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(peer = conn.peer_addr(), %err, "dropping unparseable frame");
                return;
            }
        };

        let class: FrameClass = frame.frame_type().into();
        if class == FrameClass::Error {
            // §4.6 step 5: an inbound error frame is logged and not routed
            // any further, not fed to the container state machine and not
            // answered.
            tracing::warn!(peer = conn.peer_addr(), ?frame, "received error frame from peer");
            return;
        }

        let Some(peer) = self.clients.get_by_conn(conn) else {
            tracing::warn!(peer = conn.peer_addr(), "frame from unregistered connection");
            return;
        };
        let Some(container_id) = peer.container_id() else {
            tracing::warn!(peer_id = %peer.id, "frame before container allocation");
            return;
        };

        match class {
            FrameClass::Message => self.on_message(&frame, token),
            FrameClass::Control => {
                self.dispatch_control(&container_id, &frame, conn, token);
            }
            FrameClass::Error => unreachable!("handled above"),
        }
    }

    fn dispatch_control(
        &self,
        container_id: &hoppermq_core::id::Id,
        frame: &Frame,
        conn: &Arc<dyn hoppermq_core::conn::Connection>,
        token: &CancellationToken,
    ) {
        let id_gen = self.id_gen.as_ref();
        let mut outgoing = Vec::new();
        let effects = self.containers.with_container_mut(container_id, |c| {
            c.handle(frame, id_gen, |f| outgoing.push(f))
        });

        let Some(effects) = effects else {
            tracing::warn!(%container_id, "control frame for unknown container");
            return;
        };

        self.containers.apply_effects(container_id, &effects);

        for frame in &outgoing {
            self.send_frame(conn, frame, token);
        }
    }

    /// §4.6 step 4: fan a `Message` out to every container subscribed to its
    /// topic, via an exact-match lookup on the shared topic index.
    fn on_message(&self, frame: &Frame, token: &CancellationToken) {
        let Frame::Message { topic, .. } = frame else {
            return;
        };

        let subscribers = self.containers.subscribers(topic);
        if subscribers.is_empty() && !self.options.auto_create_channel_on_publish {
            return;
        }

        for container_id in subscribers {
            let Some(client_id) = self.containers.client_id_for_container(&container_id) else {
                continue;
            };
            let Some(peer) = self.clients.get(&client_id) else {
                continue;
            };
            self.send_frame(&peer.conn, frame, token);
        }
    }

    /// §4.6 "On PeerDisconnected": remove the container from every topic it
    /// held and evict the peer record.
    fn on_disconnected(&self, conn: &Arc<dyn hoppermq_core::conn::Connection>) {
        let Some(peer) = self.clients.get_by_conn(conn) else {
            return;
        };
        self.containers.remove_by_client(&peer.id);
        let clients = self.clients.clone();
        let id = peer.id.clone();
        compio::runtime::spawn(async move {
            clients.remove(&id).await;
        })
        .detach();
    }

    fn send_frame(
        &self,
        conn: &Arc<dyn hoppermq_core::conn::Connection>,
        frame: &Frame,
        token: &CancellationToken,
    ) {
        self.bus.publish(
            BrokerEvent::SendFrame {
                conn: conn.clone(),
                bytes: frame.encode(),
            },
            token,
        );
    }
}

impl From<codec::FrameType> for FrameClass {
    fn from(frame_type: codec::FrameType) -> Self {
        codec::classify(frame_type as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoppermq_core::id::{Id, UuidGenerator};
    use std::io;

    struct FakeConn(String);

    #[async_trait::async_trait]
    impl hoppermq_core::conn::Connection for FakeConn {
        async fn close(&self) -> io::Result<()> {
            Ok(())
        }
        fn peer_addr(&self) -> String {
            self.0.clone()
        }
        fn is_closed(&self) -> bool {
            false
        }
    }

    fn router() -> (Router, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(16));
        let clients = Arc::new(ClientRegistry::new(Arc::new(UuidGenerator)));
        let containers = Arc::new(ContainerRegistry::new());
        let router = Router::new(
            bus.clone(),
            clients,
            containers,
            Arc::new(UuidGenerator),
            RouterOptions::default(),
        );
        (router, bus)
    }

    #[test]
    fn connect_allocates_container_and_sends_open() {
        let (router, bus) = router();
        let sent = bus.subscribe(EventKind::SendFrame);
        let token = CancellationToken::new();
        let conn: Arc<dyn hoppermq_core::conn::Connection> = Arc::new(FakeConn("p1".into()));

        router.on_connected(&conn, &token);

        let event = sent.try_recv().expect("Open frame sent");
        let BrokerEvent::SendFrame { bytes, .. } = event else {
            panic!("expected SendFrame");
        };
        assert!(matches!(codec::decode(&bytes).unwrap(), Frame::Open { .. }));
    }

    #[test]
    fn publish_with_no_subscribers_and_no_auto_create_is_a_no_op() {
        let (router, bus) = router();
        let sent = bus.subscribe(EventKind::SendFrame);
        let token = CancellationToken::new();

        router.on_message(
            &Frame::Message {
                topic: "news".into(),
                message_id: Id::from("m1"),
                content: bytes::Bytes::from_static(b"hi"),
                headers: hashbrown::HashMap::new(),
            },
            &token,
        );

        assert!(sent.try_recv().is_err());
    }
}
