//! Core data types shared by the decoder, the cache and the runner.
//!
//! - [`segment`] — exchange segment scaling table
//! - [`message`] — decoded message model handed to data callbacks

pub mod message;
pub mod segment;

pub use message::*;
pub use segment::*;
