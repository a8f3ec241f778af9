//! Service contracts shared by every long-running subsystem the broker
//! supervises (§6 "Service contract").
//!
//! Grounded in the Go original's `pkg/domain.Service` / `EventBusAware` /
//! `Transport` interfaces, mapped to small async traits per §9's
//! re-architecture note ("small trait/interface objects for
//! Service/Transport where runtime injection matters"), in the style of
//! `monocoque-zmtp/src/socket_trait.rs`'s `Socket` trait.

use crate::bus::EventBus;
use crate::cancellation::CancellationToken;
use crate::error::Result;

use async_trait::async_trait;
use std::sync::Arc;

/// Implemented by every subsystem the broker starts and stops as a unit.
#[async_trait]
pub trait Service: Send + Sync {
    /// Short, stable name used in logs (§6: e.g. `"tcp"`).
    fn name(&self) -> &str;

    /// Blocks until `token` is cancelled or a fatal error occurs.
    async fn run(&self, token: CancellationToken) -> Result<()>;

    /// Signals shutdown and waits for `run` to return, within the grace
    /// period the caller enforces by racing this against a deadline.
    async fn stop(&self, token: CancellationToken) -> Result<()>;
}

/// Optional capability: a service that needs the broker's event bus
/// injected before `run` (§6 "EventBusAware"). `register_event_bus` must
/// be called before `run`; most implementers instead take the bus as a
/// constructor argument directly (§9 "options-bag constructors" ->
/// explicit configuration records), but the trait exists for the few
/// callers that build a service before the bus is available.
pub trait EventBusAware {
    fn register_event_bus(&mut self, bus: Arc<EventBus>);
}
