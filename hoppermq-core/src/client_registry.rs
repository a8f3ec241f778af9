//! Client Registry (C4)
//!
//! Owns peer records, keyed by client `ID`, with a secondary scan by
//! connection. Grounded in `monocoque-core/src/router.rs`'s `RouterHub`
//! peer map, generalized from "routing-id to sender"
//! to "client ID to full peer record", and in the single
//! writer-lock/multi-reader-lock discipline used throughout that file.

use crate::conn::Connection;
use crate::id::{Id, IdGenerator};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A connected client (§3 `Peer`).
pub struct Peer {
    pub id: Id,
    pub conn: Arc<dyn Connection>,
    container_id: RwLock<Option<Id>>,
    closed: AtomicBool,
}

impl Peer {
    #[must_use]
    pub fn container_id(&self) -> Option<Id> {
        self.container_id.read().clone()
    }

    pub fn set_container_id(&self, id: Id) {
        *self.container_id.write() = Some(id);
    }
}

/// Owns peer records for the lifetime of the broker.
pub struct ClientRegistry {
    generator: Arc<dyn IdGenerator>,
    by_id: RwLock<HashMap<Id, Arc<Peer>>>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(generator: Arc<dyn IdGenerator>) -> Self {
        Self {
            generator,
            by_id: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a new `ID` via the injected generator and store the record.
    pub fn on_new(&self, conn: Arc<dyn Connection>) -> Arc<Peer> {
        let peer = Arc::new(Peer {
            id: self.generator.generate(),
            conn,
            container_id: RwLock::new(None),
            closed: AtomicBool::new(false),
        });
        self.by_id.write().insert(peer.id.clone(), peer.clone());
        peer
    }

    #[must_use]
    pub fn get(&self, id: &Id) -> Option<Arc<Peer>> {
        self.by_id.read().get(id).cloned()
    }

    /// Linear scan by connection identity. Acceptable because peer counts
    /// are moderate and this runs once per disconnect, per §4.4.
    #[must_use]
    pub fn get_by_conn(&self, conn: &Arc<dyn Connection>) -> Option<Arc<Peer>> {
        self.by_id
            .read()
            .values()
            .find(|p| Arc::ptr_eq(&p.conn, conn))
            .cloned()
    }

    /// Idempotent: closes the connection exactly once (guarded by the
    /// peer's `closed` flag) and evicts the record.
    pub async fn remove(&self, id: &Id) {
        let Some(peer) = self.by_id.write().remove(id) else {
            return;
        };
        Self::close_once(&peer).await;
    }

    /// Close every peer and clear the map. A single close failure is
    /// logged and does not fail the whole shutdown.
    pub async fn shutdown(&self) {
        let peers: Vec<Arc<Peer>> = self.by_id.write().drain().map(|(_, p)| p).collect();
        for peer in peers {
            Self::close_once(&peer).await;
        }
    }

    async fn close_once(peer: &Arc<Peer>) {
        if peer.closed.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            if let Err(err) = peer.conn.close().await {
                tracing::warn!(peer_id = %peer.id, %err, "failed to close peer connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::UuidGenerator;
    use std::io;

    struct FakeConn {
        closes: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Connection for FakeConn {
        async fn close(&self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
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
    fn remove_evicts_and_closes_exactly_once() {
        compio::runtime::Runtime::new().unwrap().block_on(async {
            let registry = ClientRegistry::new(Arc::new(UuidGenerator));
            let conn = Arc::new(FakeConn {
                closes: std::sync::atomic::AtomicUsize::new(0),
            });
            let peer = registry.on_new(conn.clone());

            registry.remove(&peer.id).await;
            registry.remove(&peer.id).await; // idempotent: no-op, no second close

            assert!(registry.get(&peer.id).is_none());
            assert!(registry.get_by_conn(&(conn.clone() as Arc<dyn Connection>)).is_none());
            assert_eq!(conn.closes.load(Ordering::SeqCst), 1);
        });
    }
}
