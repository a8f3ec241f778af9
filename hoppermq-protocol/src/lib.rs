//! # HopperMQ Protocol
//!
//! The HPMQ wire protocol and the broker-side logic built on top of it:
//!
//! - `codec`: frame encode/decode, one-shot and streaming (C1)
//! - `container`: the per-peer sans-IO session state machine (C5)
//! - `topic_index`: exact-match topic → subscriber index (C5)
//! - `container_registry`: owns containers and the shared topic index (C5)
//! - `router`: event-bus-driven dispatch tying the above together (C6)
//!
//! Sockets talk to the broker over TCP using `hoppermq`'s transport layer;
//! this crate has no I/O of its own: frames in, frames out, via plain
//! function calls and an injected callback, same separation as the
//! teacher's ZMTP session/codec split.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::needless_pass_by_ref_mut)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unused_async)]
#![allow(clippy::let_underscore_future)]
#![allow(clippy::future_not_send)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::while_let_loop)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::never_loop)]

pub mod codec;
pub mod container;
pub mod container_registry;
pub mod router;
pub mod topic_index;

pub mod prelude {
    pub use crate::codec::{
        decode, next_frame_len, Frame, FrameClass, FrameDecoder, FrameHeader, FrameType,
    };
    pub use crate::container::{Channel, Container, ContainerEffect, ContainerState};
    pub use crate::container_registry::ContainerRegistry;
    pub use crate::router::{Router, RouterOptions};
    pub use crate::topic_index::TopicIndex;
}
