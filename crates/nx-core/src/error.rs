//! Typed error definitions for the nxtrad feed client.
//!
//! Provides [`NxError`] for failures on the client surface (configuration,
//! socket session, outbound requests). Wire-level decode failures live in
//! `nx_md::decoder::DecodeError` because they never escape the receive loop.
//! All variants implement `std::error::Error` via `thiserror`, so they
//! integrate with `anyhow::Result` in binaries.

use thiserror::Error;

/// Domain-specific errors for the nxtrad feed client.
#[derive(Debug, Error)]
pub enum NxError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// An outbound request was issued while the session is not open.
    #[error("stream is not connected")]
    NotConnected,

    /// `reconnect()` was called before any `connect(token)`.
    #[error("auth token is empty, connect must be called first")]
    MissingAuthToken,

    /// No tokio runtime is available to host the receive loop.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// An outbound control message could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
