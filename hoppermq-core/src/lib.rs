//! HopperMQ Core
//!
//! Protocol-agnostic kernel shared by the broker:
//! - Pinned / io_uring-safe allocation (`alloc`)
//! - Zero-copy staged decoding buffer (`buffer`)
//! - Deadline wrappers for async I/O (`timeout`)
//! - Cooperative cancellation tree (`cancellation`)
//! - Connection abstraction (`conn`)
//! - Opaque identifiers + generator (`id`)
//! - Event bus (`bus`)
//! - Client registry (`client_registry`)
//! - Error types (`error`)
//! - Service/Transport contracts (`service`)
//! - TCP socket tuning (`tcp`)

#![deny(unsafe_code)]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::needless_pass_by_ref_mut)]
#![allow(clippy::match_same_arms)]

pub mod alloc;
pub mod buffer;
pub mod bus;
pub mod cancellation;
pub mod client_registry;
pub mod conn;
pub mod error;
pub mod id;
pub mod service;
pub mod tcp;
pub mod timeout;

/// A small prelude to make downstream crates ergonomic.
pub mod prelude {
    pub use crate::alloc::{IoArena, SlabMut};
    pub use crate::bus::{BrokerEvent, EventBus, EventKind};
    pub use crate::cancellation::CancellationToken;
    pub use crate::client_registry::{ClientRegistry, Peer};
    pub use crate::conn::Connection;
    pub use crate::error::{HopperError, Result};
    pub use crate::id::{Id, IdGenerator, UuidGenerator};
    pub use crate::service::{EventBusAware, Service};
    pub use crate::timeout::{read_with_timeout, write_all_with_timeout, write_with_timeout};
}
