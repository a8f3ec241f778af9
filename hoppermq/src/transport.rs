//! TCP transport listener (C2).
//!
//! Grounded in `monocoque-core/src/actor.rs`'s `SocketActor` split-pump loop
//! and its accept-loop shape from the ZMTP binder sockets, generalized so
//! that instead of one actor alternating both directions of one socket in a
//! single task, each accepted peer gets a reader task and a writer task,
//! each holding its own cheap `compio::net::TcpStream` clone (compio
//! streams share their underlying registered fd across clones, so this is a
//! refcount bump, not a `dup(2)`). The pair is torn down together through
//! the `TcpConnection`'s `CancellationToken`. Never touches protocol
//! semantics directly: frames are delimited with
//! `hoppermq_protocol::codec::next_frame_len` and moved on/off the event
//! bus as opaque bytes.

use crate::tcp_conn::TcpConnection;

use hoppermq_core::alloc::IoArena;
use hoppermq_core::bus::{BrokerEvent, EventBus, EventKind};
use hoppermq_core::buffer::SegmentedBuffer;
use hoppermq_core::cancellation::CancellationToken;
use hoppermq_core::conn::Connection;
use hoppermq_core::error::Result;
use hoppermq_core::service::Service;
use hoppermq_core::tcp::{enable_tcp_nodelay, shutdown_both};
use hoppermq_core::timeout::{read_with_timeout, write_all_with_timeout};

use async_trait::async_trait;
use compio::buf::BufResult;
use compio::net::{TcpListener, TcpStream};
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bytes requested per read; frames are small (§4.1), so one page covers
/// the common case and larger messages simply span more reads.
const READ_CHUNK: usize = 8192;

#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    pub listen_addr: std::net::SocketAddr,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub accept_grace: Duration,
    pub max_consecutive_timeouts: u32,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9091".parse().expect("valid default listen addr"),
            read_timeout: Duration::from_secs(50),
            write_timeout: Duration::from_secs(5),
            accept_grace: Duration::from_secs(10),
            max_consecutive_timeouts: 1,
        }
    }
}

/// Accepts TCP connections and bridges bytes to/from the event bus.
pub struct TcpTransport {
    bus: Arc<EventBus>,
    options: TransportOptions,
    active: Arc<AtomicUsize>,
}

impl TcpTransport {
    #[must_use]
    pub fn new(bus: Arc<EventBus>, options: TransportOptions) -> Self {
        Self {
            bus,
            options,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Service for TcpTransport {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn run(&self, token: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.options.listen_addr).await?;
        tracing::info!(addr = %self.options.listen_addr, "tcp transport listening");

        loop {
            futures::select! {
                _ = token.cancelled().fuse() => {
                    tracing::info!("tcp transport accept loop stopping");
                    return Ok(());
                }
                accepted = listener.accept().fuse() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            self.spawn_peer(stream, addr.to_string(), token.child_token());
                        }
                        Err(err) => {
                            tracing::warn!(%err, "accept failed");
                        }
                    }
                }
            }
        }
    }

    /// Cancels the accept loop and every live peer, then waits up to
    /// `accept_grace` for the active-connection count to drain (§4.2/§5).
    async fn stop(&self, token: CancellationToken) -> Result<()> {
        token.cancel();
        let deadline = self.options.accept_grace;
        let poll = Duration::from_millis(25);
        let mut waited = Duration::ZERO;
        while self.active.load(Ordering::SeqCst) > 0 && waited < deadline {
            compio::time::sleep(poll).await;
            waited += poll;
        }
        let remaining = self.active.load(Ordering::SeqCst);
        if remaining > 0 {
            tracing::warn!(remaining, "tcp transport stopped with connections still active");
        }
        Ok(())
    }
}

impl TcpTransport {
    fn spawn_peer(&self, stream: TcpStream, peer_addr: String, token: CancellationToken) {
        let bus = self.bus.clone();
        let options = self.options;
        let active = self.active.clone();
        active.fetch_add(1, Ordering::SeqCst);

        compio::runtime::spawn(async move {
            run_peer(stream, peer_addr, bus, options, token).await;
            active.fetch_sub(1, Ordering::SeqCst);
        })
        .detach();
    }
}

/// Owns one accepted peer end to end: publishes the lifecycle events,
/// runs the reader loop on the calling task, and spawns a sibling writer
/// task sharing this peer's `TcpConnection` identity.
async fn run_peer(
    stream: TcpStream,
    peer_addr: String,
    bus: Arc<EventBus>,
    options: TransportOptions,
    token: CancellationToken,
) {
    if let Err(err) = enable_tcp_nodelay(&stream) {
        tracing::warn!(%peer_addr, %err, "failed to set TCP_NODELAY");
    }

    let conn = TcpConnection::new(peer_addr.clone());
    let conn_dyn: Arc<dyn Connection> = conn.clone();
    let pump_token = conn.cancellation();

    bus.publish(
        BrokerEvent::PeerConnected {
            conn: conn_dyn.clone(),
            transport: "tcp",
        },
        &token,
    );

    let write_stream = stream.clone();
    let writer = spawn_writer(
        write_stream,
        conn_dyn.clone(),
        bus.clone(),
        options,
        token.clone(),
        pump_token.clone(),
    );

    let mut read_stream = stream;
    reader_loop(&mut read_stream, &conn_dyn, &bus, options, &token, &pump_token).await;

    pump_token.cancel();
    let _ = writer.await;

    if let Err(err) = shutdown_both(&read_stream) {
        tracing::debug!(%peer_addr, %err, "shutdown on peer close");
    }

    bus.publish(
        BrokerEvent::PeerDisconnected {
            conn: conn_dyn,
            peer_id: None,
        },
        &token,
    );
}

/// Resolves as soon as either `a` or `b` is cancelled: a peer's own
/// `close()` and the broker-wide shutdown both need to end its pump loops.
async fn any_cancelled(a: &CancellationToken, b: &CancellationToken) {
    futures::select! {
        () = a.cancelled().fuse() => {},
        () = b.cancelled().fuse() => {},
    }
}

/// Reads frame bytes off the wire until EOF, a hard error, cancellation,
/// or `max_consecutive_timeouts` read-deadline timeouts in a row (§4.2,
/// [SUPPLEMENT] consecutive-timeout threshold).
async fn reader_loop(
    stream: &mut TcpStream,
    conn: &Arc<dyn Connection>,
    bus: &Arc<EventBus>,
    options: TransportOptions,
    token: &CancellationToken,
    peer_token: &CancellationToken,
) {
    let mut arena = IoArena::new();
    let mut staging = SegmentedBuffer::new();
    let mut consecutive_timeouts: u32 = 0;

    loop {
        if token.is_cancelled() || peer_token.is_cancelled() {
            return;
        }

        let slab = arena.alloc_mut(READ_CHUNK);
        let read = futures::select! {
            () = any_cancelled(token, peer_token).fuse() => return,
            read = read_with_timeout(stream, slab, Some(options.read_timeout)).fuse() => read,
        };
        let BufResult(result, slab) = match read {
            Ok(br) => br,
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {
                consecutive_timeouts += 1;
                if consecutive_timeouts >= options.max_consecutive_timeouts {
                    tracing::info!(
                        peer = conn.peer_addr(),
                        consecutive_timeouts,
                        "disconnecting after consecutive read timeouts"
                    );
                    return;
                }
                continue;
            }
            Err(err) => {
                tracing::warn!(peer = conn.peer_addr(), %err, "read failed");
                return;
            }
        };

        match result {
            Ok(0) => {
                tracing::info!(peer = conn.peer_addr(), "peer closed connection");
                return;
            }
            Ok(n) => {
                consecutive_timeouts = 0;
                let bytes = slab.freeze();
                staging.push(bytes.slice(0..n));

                loop {
                    match hoppermq_protocol::codec::next_frame_len(&staging) {
                        Ok(Some(len)) => {
                            let Some(frame) = staging.take_bytes(len) else {
                                break;
                            };
                            bus.publish(
                                BrokerEvent::FrameBytesReceived {
                                    conn: conn.clone(),
                                    bytes: frame,
                                },
                                token,
                            );
                        }
                        Ok(None) => break,
                        Err(err) => {
                            tracing::warn!(peer = conn.peer_addr(), %err, "malformed frame header, dropping connection");
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(peer = conn.peer_addr(), %err, "read failed");
                return;
            }
        }
    }
}

/// Subscribes to `SendFrame` and writes every event addressed to `conn`
/// (matched by `Arc::ptr_eq`, per router.rs's own test convention), until
/// cancelled.
fn spawn_writer(
    mut stream: TcpStream,
    conn: Arc<dyn Connection>,
    bus: Arc<EventBus>,
    options: TransportOptions,
    token: CancellationToken,
    peer_token: CancellationToken,
) -> compio::runtime::JoinHandle<()> {
    compio::runtime::spawn(async move {
        let rx = bus.subscribe(EventKind::SendFrame);
        loop {
            futures::select! {
                () = any_cancelled(&token, &peer_token).fuse() => return,
                ev = rx.recv_async().fuse() => {
                    let Ok(BrokerEvent::SendFrame { conn: target, bytes }) = ev else {
                        return;
                    };
                    if !Arc::ptr_eq(&target, &conn) {
                        continue;
                    }
                    let BufResult(result, _) =
                        match write_all_with_timeout(&mut stream, bytes.to_vec(), Some(options.write_timeout)).await {
                            Ok(br) => br,
                            Err(err) => BufResult(Err(err), Vec::new()),
                        };
                    if let Err(err) = result {
                        tracing::warn!(peer = conn.peer_addr(), %err, "write failed, dropping frame");
                    }
                }
            }
        }
    })
}
