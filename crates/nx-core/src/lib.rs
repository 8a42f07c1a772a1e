//! # nx-core
//!
//! Core crate for the nxtrad feed client, providing:
//!
//! - **Types** (`types`) — segment scaling table, decoded message model
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific `NxError` via thiserror
//! - **WebSocket** (`ws`) — single-session client + reconnect backoff policy
//! - **Time utilities** (`time_util`) — receive stamps, epoch conversion
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
