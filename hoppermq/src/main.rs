//! HopperMQ broker entry point.
//!
//! Mirrors `original_source/main.go`'s shape: load configuration, bring up
//! logging, then start the broker and block until a shutdown signal
//! arrives. `SIGINT`/`SIGTERM` registration replaces the Go original's
//! `signal.Notify(a.stop, syscall.SIGINT, syscall.SIGTERM)` with
//! `signal_hook::flag::register`, polled the same way the rest of the
//! kernel observes its `CancellationToken` (§5), since there is no
//! tokio-style async signal stream available on the `compio` runtime this
//! broker runs on.
//!
//! Exit codes (§6): `0` on a clean shutdown, non-zero on a startup failure
//! (configuration load or listener bind).

use hoppermq::broker::Broker;
use hoppermq::config::Config;

use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Registers handlers for `SIGINT`/`SIGTERM` that flip a shared flag; the
/// main loop polls it the same way `CancellationToken::cancelled` polls its
/// own atomic (§5).
fn install_shutdown_signals() -> std::io::Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone())?;
    Ok(shutdown)
}

async fn wait_for_shutdown(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        compio::time::sleep(SIGNAL_POLL_INTERVAL).await;
    }
}

#[compio::main]
async fn main() {
    init_tracing();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        app = %config.app.name,
        version = %config.app.version,
        "Hey, welcome to HopperMQ"
    );

    let shutdown = match install_shutdown_signals() {
        Ok(flag) => flag,
        Err(err) => {
            tracing::error!(%err, "failed to install shutdown signal handlers");
            std::process::exit(1);
        }
    };

    let broker = Arc::new(Broker::new(&config));

    let run_broker = broker.clone();
    let mut run_task = compio::runtime::spawn(async move { run_broker.run().await });

    futures::select! {
        () = wait_for_shutdown(&shutdown).fuse() => {
            tracing::info!("shutdown signal received");
            if let Err(err) = broker.stop().await {
                tracing::error!(%err, "error while stopping broker");
            }
            if let Err(err) = (&mut run_task).await {
                tracing::error!(%err, "broker exited with an error after stop");
                std::process::exit(1);
            }
        }
        result = (&mut run_task).fuse() => {
            if let Err(err) = result {
                tracing::error!(%err, "broker exited with an error");
                std::process::exit(1);
            }
        }
    }
}
