//! Cooperative cancellation, built on a shared flag plus a short poll
//! interval rather than a dedicated cancellation-token crate.
//!
//! The kernel has no tokio dependency (no `tokio-util::CancellationToken`
//! available) and already favors `flume` channel closure for shutdown
//! signaling elsewhere (`PubSubHub`/`RouterHub`-style hubs stop when their
//! command channel closes). A tree of many clones all needing to observe
//! one cancellation doesn't fit a single-consumer channel, so this token
//! uses a shared `AtomicBool` instead; `cancelled()` is a short poll loop,
//! cheap enough for the handful of long-lived tasks (accept loop, per-peer
//! reader/writer, router handlers) that await it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A token that observes the same cancellation as `self`, for handing
    /// to a subsystem (transport, router, per-connection task) without
    /// giving it a separate identity.
    #[must_use]
    pub fn child_token(&self) -> Self {
        self.clone()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called on this token or any clone.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            compio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_observed_by_clones() {
        let token = CancellationToken::new();
        let child = token.child_token();
        assert!(!child.is_cancelled());
        token.cancel();
        assert!(child.is_cancelled());
    }
}
