/// HopperMQ Error Types
///
/// Error kinds surfaced by the broker core, covering the codec, transport,
/// event bus, and registry layers.
use std::io;
use thiserror::Error;

/// Main error type for HopperMQ core operations.
#[derive(Error, Debug)]
pub enum HopperError {
    /// IO error during connection operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Frame header failed validation (`type == 0` or `doff` not in `{2,3,4}`).
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Header type tag is well-formed but does not match any known frame type.
    #[error("unsupported frame type: {0:#x}")]
    UnsupportedFrameType(u16),

    /// Header type and payload variant disagree, or a payload field is malformed.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Buffer did not contain enough bytes to decode a frame.
    #[error("short read: need {needed} bytes, have {available}")]
    ShortRead { needed: usize, available: usize },

    /// A frame arrived while its container was in a state that does not accept it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Read returned EOF; not logged as an error, surfaced for dispatch only.
    #[error("peer closed")]
    PeerClosed,

    /// A subscriber's event bus queue was full at publish time.
    #[error("bus drop: subscriber queue full for {0}")]
    BusDrop(String),

    /// A required dependency (e.g. the event bus) was absent at `run`.
    #[error("no service available: {0}")]
    NoServiceAvailable(String),

    /// Operation aborted by cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// Deadline (read/write/shutdown grace) elapsed.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    /// Peer disconnected mid-session.
    #[error("peer disconnected: {0}")]
    PeerDisconnected(String),

    /// Configuration failed to load.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for HopperMQ core operations.
pub type Result<T> = std::result::Result<T, HopperError>;

impl HopperError {
    #[must_use]
    pub fn invalid_header(msg: impl Into<String>) -> Self {
        Self::InvalidHeader(msg.into())
    }

    #[must_use]
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    #[must_use]
    pub fn peer_disconnected(peer_id: impl Into<String>) -> Self {
        Self::PeerDisconnected(peer_id.into())
    }

    /// Whether the failed operation can reasonably be retried at the same layer.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            Self::DeadlineExceeded(_) => true,
            _ => false,
        }
    }

    /// Whether this error means the connection is gone (as opposed to a
    /// decode/logic error that leaves the session alive).
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::PeerClosed | Self::PeerDisconnected(_) | Self::DeadlineExceeded(_)
        )
    }
}
