//! `Connection` implementation backing the TCP transport (§3 `Peer.conn`).
//!
//! Grounded in `monocoque-core/src/actor.rs`'s `SocketActor`:
//! one task owns the `compio::net::TcpStream` outright and pumps writes then
//! reads in a loop rather than splitting the stream across two tasks, since
//! `compio::io::AsyncRead`/`AsyncWrite` take `&mut self` and the stream isn't
//! `Clone`. `TcpConnection` itself holds none of the I/O: it is the shared
//! handle the router addresses a peer by (via `BrokerEvent::SendFrame`'s
//! `conn: Arc<dyn Connection>`, matched with `Arc::ptr_eq` the way
//! `router.rs`'s tests already exercise it) and that the pump task tears
//! down through its own `CancellationToken`.
//!
//! That token is deliberately independent per connection:
//! `CancellationToken::child_token` (§5) hands out another handle to the
//! *same* flag rather than forking one, so it's right for propagating one
//! shutdown signal to many subsystems but wrong for a single peer's
//! `close()`, which must not cancel every other peer sharing the broker's
//! root token. The transport's pump loops race this token against the
//! broker-wide one so either can end the connection.

use hoppermq_core::cancellation::CancellationToken;
use hoppermq_core::conn::Connection;

use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle to a TCP peer, shared between the peer record and the pump task
/// that owns the actual socket. Read/write deadlines are enforced by the
/// pump loop directly from `TransportOptions` (`transport.rs`), not through
/// this handle: nothing sets a per-connection deadline independently of the
/// transport-wide one.
pub struct TcpConnection {
    peer_addr: String,
    closed: AtomicBool,
    token: CancellationToken,
}

impl TcpConnection {
    #[must_use]
    pub fn new(peer_addr: String) -> Arc<Self> {
        Arc::new(Self {
            peer_addr,
            closed: AtomicBool::new(false),
            token: CancellationToken::new(),
        })
    }

    /// The pump task's own view of its teardown signal.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.token.child_token()
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn close(&self) -> io::Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.token.cancel();
        }
        Ok(())
    }

    fn peer_addr(&self) -> String {
        self.peer_addr.clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
