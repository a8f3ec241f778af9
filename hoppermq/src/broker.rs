//! Broker composition root.
//!
//! Wires the event bus, client/container registries, router, and TCP
//! transport into one unit with a single `run`/`stop` entry point,
//! grounded in `original_source/internal/application/application.go`'s role
//! (own the broker `ID`, start every subsystem, shut them down in order on
//! signal) and in the `Service` contract
//! (`hoppermq_core::service::Service`) for the transport half.

use crate::config::Config;
use crate::transport::{TcpTransport, TransportOptions};

use hoppermq_core::bus::EventBus;
use hoppermq_core::cancellation::CancellationToken;
use hoppermq_core::client_registry::ClientRegistry;
use hoppermq_core::error::Result;
use hoppermq_core::id::{Id, IdGenerator, UuidGenerator};
use hoppermq_core::service::Service;
use hoppermq_protocol::container_registry::ContainerRegistry;
use hoppermq_protocol::router::{Router, RouterOptions};

use std::sync::Arc;
use std::time::Duration;

/// A running broker: the event bus plus every subsystem that was started
/// alongside it, ready to be torn down as a unit.
pub struct Broker {
    id: Id,
    bus: Arc<EventBus>,
    clients: Arc<ClientRegistry>,
    containers: Arc<ContainerRegistry>,
    router: Arc<Router>,
    transport: Arc<TcpTransport>,
    shutdown_grace: Duration,
    token: CancellationToken,
}

impl Broker {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let id_gen: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);
        let bus = Arc::new(EventBus::new(config.bus.subscriber_buffer));
        let clients = Arc::new(ClientRegistry::new(id_gen.clone()));
        let containers = Arc::new(ContainerRegistry::new());

        let router = Arc::new(Router::new(
            bus.clone(),
            clients.clone(),
            containers.clone(),
            id_gen.clone(),
            RouterOptions {
                auto_create_channel_on_publish: config.broker.auto_create_channel_on_publish,
            },
        ));

        let transport = Arc::new(TcpTransport::new(
            bus.clone(),
            TransportOptions {
                listen_addr: config.transport.listen_socket_addr(),
                read_timeout: config.transport.read_timeout(),
                write_timeout: config.transport.write_timeout(),
                accept_grace: config.transport.accept_grace(),
                max_consecutive_timeouts: config.transport.max_consecutive_timeouts,
            },
        ));

        Self {
            id: Id::from(config.app.id.as_str()),
            bus,
            clients,
            containers,
            router,
            transport,
            shutdown_grace: config.broker.shutdown_grace(),
            token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    #[must_use]
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Starts the router and the TCP transport and blocks until `stop` is
    /// called (or the process-wide cancellation token any caller holds a
    /// clone of is cancelled).
    pub async fn run(&self) -> Result<()> {
        tracing::info!(broker_id = %self.id, "broker starting");

        let router = self.router.clone();
        let router_token = self.token.child_token();
        let router_task = compio::runtime::spawn(async move {
            router.run(router_token).await;
        });

        let transport_result = self.transport.run(self.token.child_token()).await;

        let _ = router_task.await;
        transport_result
    }

    /// Cancels every subsystem and waits up to `shutdown_grace` for the
    /// transport to drain (§5, §6 "broker-level shutdown grace").
    pub async fn stop(&self) -> Result<()> {
        tracing::info!(broker_id = %self.id, "broker stopping");
        self.token.cancel();

        let stop = self.transport.stop(self.token.child_token());
        match compio::time::timeout(self.shutdown_grace, stop).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!("broker shutdown grace period elapsed before transport fully stopped");
            }
        }

        self.clients.shutdown().await;
        tracing::info!(broker_id = %self.id, "broker stopped");
        Ok(())
    }
}
