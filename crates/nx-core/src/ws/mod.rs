//! WebSocket session and reconnect policy.

pub mod client;
pub mod reconnect;

pub use client::{LinkEvent, OnBinaryCallback, OnLinkCallback, WsConnConfig, WsConnection};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
