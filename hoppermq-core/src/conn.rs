//! Connection abstraction.
//!
//! Grounded in the Go original's `pkg/domain.Connection` interface: peer
//! records, the reader task, and the writer task all share one connection
//! handle through this trait rather than a concrete transport type, so the
//! session core never depends on `compio::net::TcpStream` directly. `close`
//! must be idempotent; implementations guard it with their own flag.

use async_trait::async_trait;
use std::io;

#[async_trait]
pub trait Connection: Send + Sync {
    /// Close the connection. Safe to call more than once; only the first
    /// call has an effect.
    async fn close(&self) -> io::Result<()>;

    /// Human-readable remote address, for logging.
    fn peer_addr(&self) -> String;

    /// Whether `close` has already run.
    fn is_closed(&self) -> bool;
}
