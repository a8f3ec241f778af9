//! TCP socket tuning, protocol-agnostic and shared by any transport built
//! on `compio::net::TcpStream`.
//!
//! Grounded directly in `monocoque-core/src/tcp.rs`: the
//! broker doesn't get a `compio`-native way to set `TCP_NODELAY`, so this
//! reaches for the raw fd via `socket2` the same way, encapsulating the
//! `unsafe` in one place.
//!
//! # Safety
//!
//! Uses unsafe code to access the raw file descriptor/socket for TCP
//! socket configuration. The unsafe operations are encapsulated here and
//! safe to call from the public API.

#![allow(unsafe_code)]

use std::io;

/// Disable Nagle's algorithm on `stream`, trading bandwidth efficiency for
/// lower per-frame latency. HPMQ frames are typically small and
/// latency-sensitive (handshake, subscribe acks), so coalescing delay is
/// undesirable.
///
/// # Errors
///
/// Returns an error if the socket option cannot be set.
#[inline]
pub fn enable_tcp_nodelay(stream: &compio::net::TcpStream) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::{AsRawFd, FromRawFd};
        let fd = stream.as_raw_fd();
        let sock = unsafe { socket2::Socket::from_raw_fd(fd) };
        sock.set_nodelay(true)?;
        std::mem::forget(sock); // don't close the fd on drop
        Ok(())
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::{AsRawSocket, FromRawSocket};
        let raw = stream.as_raw_socket();
        let sock = unsafe { socket2::Socket::from_raw_socket(raw) };
        sock.set_nodelay(true)?;
        std::mem::forget(sock); // don't close the socket on drop
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    {
        Ok(())
    }
}

/// Shut down both directions of `stream`.
///
/// `compio`'s completion-based `TcpStream` has no synchronous `shutdown`
/// of its own; `std::net::TcpStream::shutdown` is itself a plain
/// non-blocking syscall (`shutdown(2)`), so this reaches for the same fd
/// as [`enable_tcp_nodelay`] to issue it without an `await` point. The
/// reader task's next read then observes EOF and the connection's own
/// close path stays synchronous and idempotent-safe.
///
/// # Errors
///
/// Returns an error if the underlying `shutdown` syscall fails.
#[inline]
pub fn shutdown_both(stream: &compio::net::TcpStream) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::{AsRawFd, FromRawFd};
        let fd = stream.as_raw_fd();
        let sock = unsafe { socket2::Socket::from_raw_fd(fd) };
        let result = sock.shutdown(std::net::Shutdown::Both);
        std::mem::forget(sock);
        result
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::{AsRawSocket, FromRawSocket};
        let raw = stream.as_raw_socket();
        let sock = unsafe { socket2::Socket::from_raw_socket(raw) };
        let result = sock.shutdown(std::net::Shutdown::Both);
        std::mem::forget(sock);
        result
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = stream;
        Ok(())
    }
}
