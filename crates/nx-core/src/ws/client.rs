//! Single WebSocket session.
//!
//! Each `WsConnection` runs as a tokio task that:
//! 1. Connects to the feed endpoint (TLS or plain).
//! 2. Reports the open / close / failure through a link callback.
//! 3. Forwards every binary frame to a callback, in arrival order.
//! 4. Drains an outbound channel so socket writes stay on one task.
//!
//! A session never reconnects on its own. When the socket goes away the task
//! reports it and exits; retry policy belongs to the owner.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, error, info, warn};

use crate::error::NxError;

/// Close reason reported when the owner shuts the session down.
pub const CLIENT_CLOSE_REASON: &str = "client disconnect";

/// Transport-level session events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Handshake completed.
    Opened,
    /// Socket closed, by either side.
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
    /// Handshake or read/write failure. The session is over.
    Failed(String),
}

/// Callback invoked for each session event.
pub type OnLinkCallback = Arc<dyn Fn(LinkEvent) + Send + Sync>;

/// Callback invoked for each received binary frame.
pub type OnBinaryCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Configuration for a single WebSocket session.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL including query parameters.
    pub url: String,
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
    /// Session identifier, used only in log lines.
    pub id: u64,
}

/// A single WebSocket session managed by a background tokio task.
pub struct WsConnection {
    /// Connection configuration.
    pub config: WsConnConfig,
    /// Channel to send outbound text frames.
    outbound_tx: Option<mpsc::UnboundedSender<String>>,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl WsConnection {
    /// Create a new (not yet started) session.
    pub fn new(config: WsConnConfig) -> Self {
        Self {
            config,
            outbound_tx: None,
            shutdown_tx: None,
        }
    }

    /// Spawn the session task on `handle`. The task is detached and ends on
    /// its own after `shutdown` or a socket close.
    pub fn start(
        &mut self,
        handle: &tokio::runtime::Handle,
        on_link: OnLinkCallback,
        on_binary: OnBinaryCallback,
    ) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let config = self.config.clone();

        handle.spawn(async move {
            session_loop(config, on_link, on_binary, outbound_rx, shutdown_rx).await;
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.outbound_tx = Some(outbound_tx);
    }

    /// Queue a text frame. The session task performs the actual write, so
    /// this is safe to call from any thread.
    pub fn send(&self, msg: String) -> Result<(), NxError> {
        let tx = self.outbound_tx.as_ref().ok_or(NxError::NotConnected)?;
        tx.send(msg).map_err(|_| NxError::NotConnected)
    }

    /// Signal the task to close the socket without waiting for it.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        self.outbound_tx = None;
    }
}

/// Session body: connect, then read / write until closed.
async fn session_loop(
    config: WsConnConfig,
    on_link: OnLinkCallback,
    on_binary: OnBinaryCallback,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let id = config.id;
    info!("[ws-{id}] connecting to {}", redact_query(&config.url));

    let ws_stream = tokio::select! {
        res = connect_ws(&config) => match res {
            Ok(s) => s,
            Err(e) => {
                error!("[ws-{id}] connection failed: {e}");
                on_link(LinkEvent::Failed(e.to_string()));
                return;
            }
        },
        _ = shutdown_rx.changed() => {
            info!("[ws-{id}] shutdown before handshake completed");
            on_link(client_closed());
            return;
        }
    };

    info!("[ws-{id}] connected");
    on_link(LinkEvent::Opened);

    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                info!("[ws-{id}] shutdown signal received");
                let _ = ws_write.close().await;
                on_link(client_closed());
                return;
            }

            msg = ws_read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        on_binary(&data[..]);
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("[ws-{id}] text frame ignored: {}", text.as_str());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!("[ws-{id}] received close frame: {frame:?}");
                        on_link(closed_from_frame(frame));
                        return;
                    }
                    Some(Err(e)) => {
                        error!("[ws-{id}] read error: {e}");
                        on_link(LinkEvent::Failed(e.to_string()));
                        return;
                    }
                    None => {
                        warn!("[ws-{id}] stream ended");
                        on_link(LinkEvent::Closed { code: None, reason: None });
                        return;
                    }
                    _ => {} // Pong, Frame
                }
            }

            Some(msg) = outbound_rx.recv() => {
                if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
                    error!("[ws-{id}] send error: {e}");
                    on_link(LinkEvent::Failed(e.to_string()));
                    return;
                }
            }
        }
    }
}

fn client_closed() -> LinkEvent {
    LinkEvent::Closed {
        code: Some(1000),
        reason: Some(CLIENT_CLOSE_REASON.to_string()),
    }
}

fn closed_from_frame(frame: Option<CloseFrame>) -> LinkEvent {
    match frame {
        Some(f) => {
            let reason = f.reason.as_str();
            LinkEvent::Closed {
                code: Some(u16::from(f.code)),
                reason: (!reason.is_empty()).then(|| reason.to_string()),
            }
        }
        None => LinkEvent::Closed {
            code: None,
            reason: None,
        },
    }
}

/// Establish the WebSocket connection.
async fn connect_ws(
    config: &WsConnConfig,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    NxError,
> {
    let mut request = config.url.as_str().into_client_request().map_err(ws_err)?;

    for (key, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(ws_err)?;
        let value = HeaderValue::from_str(value).map_err(ws_err)?;
        request.headers_mut().insert(name, value);
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(ws_err)?;
    Ok(stream)
}

fn ws_err(e: impl std::fmt::Display) -> NxError {
    NxError::WebSocket(e.to_string())
}

/// Strip the query string so auth tokens never reach the logs.
fn redact_query(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut u) => {
            u.set_query(None);
            u.to_string()
        }
        Err(_) => String::from("<invalid url>"),
    }
}
