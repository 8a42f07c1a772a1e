//! # nx-md
//!
//! Market data client for the nxtrad binary streaming feed.
//!
//! ## Receive path
//!
//! ```text
//! socket ─► frame (envelope, zlib) ─► sub-packets ─► decoder (per type)
//!        ─► snapshot cache (quote, greeks) ─► data callback
//! ```
//!
//! - [`field_spec`] — static `(packet type, tag)` layout tables
//! - [`frame`] — envelope parsing, decompression, sub-packet splitting
//! - [`decoder`] — typed decoders and [`decoder::DecodeError`]
//! - [`cache`] — symbol-keyed snapshot cache with a pure merge
//! - [`pipeline`] — [`pipeline::FeedDecoder`], bytes in, messages out
//!
//! ## Control path
//!
//! - [`request`] — subscription request builders
//! - [`stream`] — [`stream::NxStream`] connection manager and callbacks
//! - [`supervisor`] — backoff reconnects and keep-alive pings

pub mod cache;
pub mod decoder;
pub mod field_spec;
pub mod frame;
pub mod pipeline;
pub mod request;
pub mod stream;
pub mod supervisor;

pub use pipeline::FeedDecoder;
pub use request::{StreamKind, SubscriptionRequest};
pub use stream::{ConnectionEvent, ConnectionStatus, LinkState, NxStream, StreamOptions};
pub use supervisor::{ReconnectSupervisor, SupervisorExit, SupervisorHandle};
