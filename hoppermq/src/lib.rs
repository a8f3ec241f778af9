//! # HopperMQ
//!
//! The message broker's session core: TCP transport, the HPMQ binary frame
//! protocol, and topic-based routing between connected peers.
//!
//! ## Architecture
//!
//! HopperMQ is structured as a **broker kernel** with clean layering,
//! mirroring the separation the original Go implementation draws between
//! its transport, event bus, and broker packages:
//!
//! - **`hoppermq-core`**: transport-agnostic kernel: event bus, client
//!   registry, connection abstraction, cancellation, pooled I/O buffers.
//! - **`hoppermq-protocol`**: the HPMQ frame codec and the sans-IO session
//!   state machine (containers, topic index, router).
//! - **`hoppermq`**: this crate: configuration, the TCP transport, and the
//!   broker composition root that wires the above into a running server.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = hoppermq::config::Config::load()?;
//! let broker = hoppermq::broker::Broker::new(&config);
//! broker.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety
//!
//! `unsafe` code is isolated to `hoppermq-core`'s allocation and TCP-tuning
//! modules; this crate and `hoppermq-protocol` are 100% safe Rust.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::future_not_send)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod broker;
pub mod config;
pub mod dev_tracing;
pub mod tcp_conn;
pub mod transport;
