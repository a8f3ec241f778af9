//! End-to-end router scenarios driven entirely through the event bus, the
//! same seam the broker composition root wires the router to (no sockets
//! involved; `FakeConn` stands in for a transport). Mirrors the worked
//! examples: a peer connects, completes the handshake, subscribes, and a
//! publish fans out to every subscriber; a disconnect tears the container
//! down.

use bytes::Bytes;
use hashbrown::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use hoppermq_core::bus::{BrokerEvent, EventBus, EventKind};
use hoppermq_core::cancellation::CancellationToken;
use hoppermq_core::client_registry::ClientRegistry;
use hoppermq_core::conn::Connection;
use hoppermq_core::id::{Id, UuidGenerator};
use hoppermq_protocol::codec::{self, Frame};
use hoppermq_protocol::container_registry::ContainerRegistry;
use hoppermq_protocol::router::{Router, RouterOptions};

struct FakeConn(String);

#[async_trait::async_trait]
impl Connection for FakeConn {
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

fn conn(addr: &str) -> Arc<dyn Connection> {
    Arc::new(FakeConn(addr.to_string()))
}

/// Spawns the router against a fresh bus/registries, returning the handle
/// the test drives with and the `SendFrame` subscription to assert on.
struct Harness {
    bus: Arc<EventBus>,
    token: CancellationToken,
    task: compio::runtime::JoinHandle<()>,
}

impl Harness {
    fn new() -> (Self, flume::Receiver<BrokerEvent>) {
        let bus = Arc::new(EventBus::new(64));
        let clients = Arc::new(ClientRegistry::new(Arc::new(UuidGenerator)));
        let containers = Arc::new(ContainerRegistry::new());
        let router = Arc::new(Router::new(
            bus.clone(),
            clients,
            containers,
            Arc::new(UuidGenerator),
            RouterOptions::default(),
        ));
        let sent = bus.subscribe(EventKind::SendFrame);
        let token = CancellationToken::new();

        let run_router = router.clone();
        let run_token = token.child_token();
        let task = compio::runtime::spawn(async move { run_router.run(run_token).await });

        (Self { bus, token, task }, sent)
    }

    async fn shutdown(self) {
        self.token.cancel();
        let _ = self.task.await;
    }
}

/// Waits for `rx` to yield a frame, retrying briefly: the router handles
/// each bus event on its own task, so the test side can't just `try_recv`
/// immediately after publishing.
async fn recv_frame(rx: &flume::Receiver<BrokerEvent>) -> Frame {
    for _ in 0..50 {
        if let Ok(BrokerEvent::SendFrame { bytes, .. }) = rx.try_recv() {
            return codec::decode(&bytes).expect("valid frame");
        }
        compio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for a SendFrame event");
}

#[compio::test]
async fn handshake_reaches_connected_and_replies_begin() {
    let (h, sent) = Harness::new();

    let peer_conn = conn("p1");
    h.bus.publish(
        BrokerEvent::PeerConnected {
            conn: peer_conn.clone(),
            transport: "tcp",
        },
        &h.token,
    );

    let open = recv_frame(&sent).await;
    let Frame::Open { source_id, .. } = open else {
        panic!("expected Open, got {open:?}");
    };

    let connect = Frame::Connect {
        source_id,
        client_version: "1.0.0".into(),
        keep_alive: 30,
    };
    h.bus.publish(
        BrokerEvent::FrameBytesReceived {
            conn: peer_conn.clone(),
            bytes: connect.encode(),
        },
        &h.token,
    );

    let begin = recv_frame(&sent).await;
    assert!(matches!(begin, Frame::Begin { .. }));

    h.shutdown().await;
}

#[compio::test]
async fn subscribe_is_idempotent_and_publish_fans_out_to_every_subscriber() {
    let (h, sent) = Harness::new();

    // Two peers connect and complete the handshake.
    let mut source_ids = Vec::new();
    let conns: Vec<Arc<dyn Connection>> = vec![conn("p1"), conn("p2")];
    for c in &conns {
        h.bus.publish(
            BrokerEvent::PeerConnected {
                conn: c.clone(),
                transport: "tcp",
            },
            &h.token,
        );
        let Frame::Open { source_id, .. } = recv_frame(&sent).await else {
            panic!("expected Open");
        };
        h.bus.publish(
            BrokerEvent::FrameBytesReceived {
                conn: c.clone(),
                bytes: Frame::Connect {
                    source_id: source_id.clone(),
                    client_version: "1.0.0".into(),
                    keep_alive: 30,
                }
                .encode(),
            },
            &h.token,
        );
        assert!(matches!(recv_frame(&sent).await, Frame::Begin { .. }));
        source_ids.push(source_id);
    }

    // Both subscribe to "news"; the first one twice (idempotent: no second
    // effect, no duplicate delivery below).
    for c in &conns {
        h.bus.publish(
            BrokerEvent::FrameBytesReceived {
                conn: c.clone(),
                bytes: Frame::Subscribe {
                    topic: "news".into(),
                    qos: 0,
                    routing_key: String::new(),
                }
                .encode(),
            },
            &h.token,
        );
    }
    h.bus.publish(
        BrokerEvent::FrameBytesReceived {
            conn: conns[0].clone(),
            bytes: Frame::Subscribe {
                topic: "news".into(),
                qos: 0,
                routing_key: String::new(),
            }
            .encode(),
        },
        &h.token,
    );

    // Give the router time to process the three Subscribe frames before
    // publishing: no reply frame is sent for a successful subscribe, so
    // there's nothing to recv_frame on here.
    compio::time::sleep(Duration::from_millis(50)).await;

    // A third peer publishes into "news" (never subscribes itself).
    let publisher = conn("p3");
    h.bus.publish(
        BrokerEvent::FrameBytesReceived {
            conn: publisher,
            bytes: Frame::Message {
                topic: "news".into(),
                message_id: Id::from("m1"),
                content: Bytes::from_static(b"hello"),
                headers: HashMap::new(),
            }
            .encode(),
        },
        &h.token,
    );

    let first = recv_frame(&sent).await;
    let second = recv_frame(&sent).await;
    for frame in [&first, &second] {
        let Frame::Message { topic, content, .. } = frame else {
            panic!("expected Message fan-out, got {frame:?}");
        };
        assert_eq!(topic, "news");
        assert_eq!(content.as_ref(), b"hello");
    }
    // Exactly one delivery per distinct subscriber, despite the duplicate
    // Subscribe.
    assert!(sent.try_recv().is_err());

    h.shutdown().await;
}

#[compio::test]
async fn disconnect_tears_down_subscriptions_so_later_publishes_see_no_subscribers() {
    let (h, sent) = Harness::new();

    let peer_conn = conn("p1");
    h.bus.publish(
        BrokerEvent::PeerConnected {
            conn: peer_conn.clone(),
            transport: "tcp",
        },
        &h.token,
    );
    let Frame::Open { source_id, .. } = recv_frame(&sent).await else {
        panic!("expected Open");
    };
    h.bus.publish(
        BrokerEvent::FrameBytesReceived {
            conn: peer_conn.clone(),
            bytes: Frame::Connect {
                source_id,
                client_version: "1.0.0".into(),
                keep_alive: 30,
            }
            .encode(),
        },
        &h.token,
    );
    assert!(matches!(recv_frame(&sent).await, Frame::Begin { .. }));

    h.bus.publish(
        BrokerEvent::FrameBytesReceived {
            conn: peer_conn.clone(),
            bytes: Frame::Subscribe {
                topic: "news".into(),
                qos: 0,
                routing_key: String::new(),
            }
            .encode(),
        },
        &h.token,
    );
    compio::time::sleep(Duration::from_millis(50)).await;

    h.bus.publish(
        BrokerEvent::PeerDisconnected {
            conn: peer_conn,
            peer_id: None,
        },
        &h.token,
    );
    compio::time::sleep(Duration::from_millis(50)).await;

    let publisher = conn("p2");
    h.bus.publish(
        BrokerEvent::FrameBytesReceived {
            conn: publisher,
            bytes: Frame::Message {
                topic: "news".into(),
                message_id: Id::from("m1"),
                content: Bytes::from_static(b"too late"),
                headers: HashMap::new(),
            }
            .encode(),
        },
        &h.token,
    );
    compio::time::sleep(Duration::from_millis(50)).await;

    assert!(sent.try_recv().is_err(), "disconnected peer must not receive further messages");

    h.shutdown().await;
}
