//! Event Bus (C3)
//!
//! Intra-process typed pub/sub with bounded per-subscriber queues, grounded
//! in `monocoque-core`'s `PubSubHub`/`RouterHub` hub pattern. Generalized
//! from "one topic tag among many" to the broker's four fixed event kinds,
//! and from "silently drop on full" to "drop and log", matching this
//! codebase's logging conventions elsewhere.
//!
//! Concurrency model: subscriber lists are guarded by a single
//! reader/writer lock (per spec §4.3's "reader/writer discipline"); publish
//! takes the read lock, so concurrent publishes from different producer
//! tasks proceed in parallel and never block on a slow consumer: a full
//! subscriber queue is dropped, not waited on.

use crate::cancellation::CancellationToken;
use crate::conn::Connection;
use crate::id::Id;

use bytes::Bytes;
use flume::{Receiver, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default subscriber queue capacity (§4.3).
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PeerConnected,
    PeerDisconnected,
    FrameBytesReceived,
    SendFrame,
}

/// Events surfaced on the bus (§4.3).
#[derive(Clone)]
pub enum BrokerEvent {
    PeerConnected {
        conn: Arc<dyn Connection>,
        transport: &'static str,
    },
    PeerDisconnected {
        conn: Arc<dyn Connection>,
        peer_id: Option<Id>,
    },
    FrameBytesReceived {
        conn: Arc<dyn Connection>,
        bytes: Bytes,
    },
    SendFrame {
        conn: Arc<dyn Connection>,
        bytes: Bytes,
    },
}

impl BrokerEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::PeerConnected { .. } => EventKind::PeerConnected,
            Self::PeerDisconnected { .. } => EventKind::PeerDisconnected,
            Self::FrameBytesReceived { .. } => EventKind::FrameBytesReceived,
            Self::SendFrame { .. } => EventKind::SendFrame,
        }
    }
}

#[derive(Default)]
struct Subscribers {
    txs: Vec<Sender<BrokerEvent>>,
}

/// The broker's in-process event bus.
pub struct EventBus {
    subscriber_buffer: usize,
    subs: RwLock<HashMap<EventKind, Subscribers>>,
    drops: [AtomicU64; 4],
}

impl EventBus {
    #[must_use]
    pub fn new(subscriber_buffer: usize) -> Self {
        Self {
            subscriber_buffer,
            subs: RwLock::new(HashMap::new()),
            drops: Default::default(),
        }
    }

    /// Grows the subscriber set for `kind`; the returned queue is created
    /// at subscribe time, per §4.3.
    pub fn subscribe(&self, kind: EventKind) -> Receiver<BrokerEvent> {
        let (tx, rx) = flume::bounded(self.subscriber_buffer);
        self.subs.write().entry(kind).or_default().txs.push(tx);
        rx
    }

    /// Fan out `event` to every subscriber of `event.kind()`.
    ///
    /// Never blocks the producer on a slow consumer: a full queue is
    /// dropped for that subscriber and counted. If `token` is cancelled
    /// mid-fanout, the remaining subscribers are skipped.
    pub fn publish(&self, event: BrokerEvent, token: &CancellationToken) {
        let kind = event.kind();
        let subs = self.subs.read();
        let Some(group) = subs.get(&kind) else {
            return;
        };

        for tx in &group.txs {
            if token.is_cancelled() {
                return;
            }
            if tx.try_send(event.clone()).is_err() {
                let idx = kind as usize;
                self.drops[idx].fetch_add(1, Ordering::Relaxed);
                tracing::warn!(?idx, "event bus dropped event: subscriber queue full");
            }
        }
    }

    /// Total dropped-event count for `kind`, for diagnostics/tests.
    #[must_use]
    pub fn drop_count(&self, kind: EventKind) -> u64 {
        self.drops[kind as usize].load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FakeConn;

    #[async_trait::async_trait]
    impl Connection for FakeConn {
        async fn close(&self) -> io::Result<()> {
            Ok(())
        }
        fn peer_addr(&self) -> String {
            "fake".into()
        }
        fn is_closed(&self) -> bool {
            false
        }
    }

    #[test]
    fn backpressure_drop_does_not_block_publisher() {
        let bus = EventBus::new(2);
        let rx = bus.subscribe(EventKind::SendFrame);
        let token = CancellationToken::new();
        let conn: Arc<dyn Connection> = Arc::new(FakeConn);

        for _ in 0..5 {
            bus.publish(
                BrokerEvent::SendFrame {
                    conn: conn.clone(),
                    bytes: Bytes::new(),
                },
                &token,
            );
        }

        assert_eq!(rx.len(), 2);
        assert_eq!(bus.drop_count(EventKind::SendFrame), 3);
    }

    #[test]
    fn publish_before_subscribe_is_a_silent_no_op() {
        let bus = EventBus::new(4);
        let token = CancellationToken::new();
        let conn: Arc<dyn Connection> = Arc::new(FakeConn);
        // No subscribers registered yet for PeerConnected.
        bus.publish(
            BrokerEvent::PeerConnected {
                conn,
                transport: "tcp",
            },
            &token,
        );
    }
}
