//! Connection manager for the streaming feed.
//!
//! [`NxStream`] owns one WebSocket session at a time, decodes every binary
//! frame it receives and hands the results to the registered data callback.
//! Connection lifecycle changes go to a second callback slot.
//!
//! ```text
//! Disconnected --connect--> Connecting --open--> Connected
//!      ^                        |                    |
//!      +------close / error-----+--------------------+
//! ```
//!
//! The stream never reconnects on its own; see
//! [`nx_core::ws::reconnect::ReconnectPolicy`] for the backoff the runner
//! drives through [`NxStream::reconnect`].
//!
//! Callbacks run on the session task, one at a time and in arrival order,
//! with no internal lock held, so they may call back into the stream
//! (typically to subscribe once connected).

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use nx_core::config::{DEFAULT_HOST, DEFAULT_PATH, DEFAULT_PROTOCOL_VERSION, StreamConfig};
use nx_core::error::NxError;
use nx_core::ws::client::{LinkEvent, OnBinaryCallback, OnLinkCallback, WsConnConfig, WsConnection};
use nx_core::{DecodedMessage, MessageType};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::decoder::DecodeOptions;
use crate::pipeline::{DecodeStats, FeedDecoder};
use crate::request::{StreamKind, SubscriptionRequest};

/// Status reported to the connection callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Closed,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the connection callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionEvent {
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConnectionEvent {
    fn status(status: ConnectionStatus) -> Self {
        Self {
            status,
            code: None,
            reason: None,
        }
    }
}

/// Session state as seen by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

pub type ConnectionCallback = Arc<dyn Fn(&NxStream, &ConnectionEvent) + Send + Sync>;
pub type DataCallback = Arc<dyn Fn(&NxStream, &DecodedMessage) + Send + Sync>;

/// Endpoint and decoding settings.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Endpoint without query string, e.g. `wss://api.tradejini.com/v2.1/stream`.
    pub base_url: String,
    pub protocol_version: String,
    pub extra_headers: HashMap<String, String>,
    pub decode: DecodeOptions,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            base_url: format!("wss://{DEFAULT_HOST}{DEFAULT_PATH}"),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            extra_headers: HashMap::new(),
            decode: DecodeOptions::default(),
        }
    }
}

impl From<&StreamConfig> for StreamOptions {
    fn from(cfg: &StreamConfig) -> Self {
        Self {
            base_url: cfg.effective_base_url(),
            protocol_version: cfg.effective_protocol_version().to_string(),
            extra_headers: cfg.effective_extra_headers(),
            decode: DecodeOptions {
                strict_segments: cfg.is_strict_segments(),
            },
        }
    }
}

struct Inner {
    link: LinkState,
    token: String,
    conn: Option<WsConnection>,
}

struct Shared {
    options: StreamOptions,
    inner: Mutex<Inner>,
    decoder: Mutex<FeedDecoder>,
    on_connection: RwLock<Option<ConnectionCallback>>,
    on_data: RwLock<Option<DataCallback>>,
    /// Bumped by every session start; events from older sessions are dropped.
    generation: AtomicU64,
}

/// Streaming feed client. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct NxStream {
    shared: Arc<Shared>,
}

impl NxStream {
    pub fn new(options: StreamOptions) -> Self {
        let decoder = FeedDecoder::new(options.decode);
        Self {
            shared: Arc::new(Shared {
                options,
                inner: Mutex::new(Inner {
                    link: LinkState::Disconnected,
                    token: String::new(),
                    conn: None,
                }),
                decoder: Mutex::new(decoder),
                on_connection: RwLock::new(None),
                on_data: RwLock::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(cfg: &StreamConfig) -> Self {
        Self::new(StreamOptions::from(cfg))
    }

    /// Register the connection lifecycle callback, replacing any previous one.
    pub fn on_connection<F>(&self, f: F)
    where
        F: Fn(&NxStream, &ConnectionEvent) + Send + Sync + 'static,
    {
        *self.shared.on_connection.write() = Some(Arc::new(f));
    }

    /// Register the data callback, replacing any previous one.
    pub fn on_data<F>(&self, f: F)
    where
        F: Fn(&NxStream, &DecodedMessage) + Send + Sync + 'static,
    {
        *self.shared.on_data.write() = Some(Arc::new(f));
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open a session authenticated with `token` (`apikey:access_token`).
    /// Returns once the session task is spawned; the outcome arrives on the
    /// connection callback. Must be called within a tokio runtime.
    pub fn connect(&self, token: &str) -> Result<(), NxError> {
        let handle = current_runtime()?;
        self.shared.inner.lock().token = token.to_string();
        self.open_session(&handle, token)
    }

    /// Close the session. Idempotent.
    pub fn disconnect(&self) {
        let mut inner = self.shared.inner.lock();
        inner.link = LinkState::Disconnected;
        if let Some(conn) = inner.conn.as_mut() {
            info!("disconnecting");
            conn.shutdown();
        }
    }

    /// Re-open the session with the last token. No-op while a session is
    /// connected or connecting.
    pub fn reconnect(&self) -> Result<(), NxError> {
        let token = {
            let inner = self.shared.inner.lock();
            if inner.token.is_empty() {
                return Err(NxError::MissingAuthToken);
            }
            if inner.link != LinkState::Disconnected {
                debug!(state = ?inner.link, "reconnect skipped");
                return Ok(());
            }
            inner.token.clone()
        };
        let handle = current_runtime()?;
        info!("reconnecting");
        self.open_session(&handle, &token)
    }

    pub fn state(&self) -> LinkState {
        self.shared.inner.lock().link
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Full endpoint URL for `token`.
    pub fn endpoint_url(&self, token: &str) -> Result<String, NxError> {
        let opts = &self.shared.options;
        let mut url = url::Url::parse(&opts.base_url)
            .map_err(|e| NxError::Config(format!("invalid stream url {}: {e}", opts.base_url)))?;
        url.query_pairs_mut()
            .append_pair("token", token)
            .append_pair("version", &opts.protocol_version);
        Ok(url.into())
    }

    fn open_session(&self, handle: &tokio::runtime::Handle, token: &str) -> Result<(), NxError> {
        let url = self.endpoint_url(token)?;
        let generation = {
            let mut inner = self.shared.inner.lock();
            if let Some(mut old) = inner.conn.take() {
                old.shutdown();
            }
            inner.link = LinkState::Connecting;
            self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        self.emit_connection(&ConnectionEvent::status(ConnectionStatus::Connecting));

        let weak = Arc::downgrade(&self.shared);
        let on_link: OnLinkCallback = {
            let weak = weak.clone();
            Arc::new(move |event| {
                if let Some(stream) = upgrade(&weak) {
                    stream.handle_link(generation, event);
                }
            })
        };
        let on_binary: OnBinaryCallback = Arc::new(move |data| {
            if let Some(stream) = upgrade(&weak) {
                stream.handle_frame(generation, data);
            }
        });

        let mut inner = self.shared.inner.lock();
        if self.shared.generation.load(Ordering::SeqCst) != generation
            || inner.link != LinkState::Connecting
        {
            // Superseded or disconnected from inside the connecting callback.
            return Ok(());
        }
        let mut conn = WsConnection::new(WsConnConfig {
            url,
            extra_headers: self.shared.options.extra_headers.clone(),
            id: generation,
        });
        conn.start(handle, on_link, on_binary);
        inner.conn = Some(conn);
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == generation
    }

    fn handle_link(&self, generation: u64, event: LinkEvent) {
        let conn_event = {
            let mut inner = self.shared.inner.lock();
            if !self.is_current(generation) {
                debug!(generation, ?event, "event from superseded session ignored");
                return;
            }
            match event {
                LinkEvent::Opened => {
                    inner.link = LinkState::Connected;
                    ConnectionEvent::status(ConnectionStatus::Connected)
                }
                LinkEvent::Closed { code, reason } => {
                    inner.link = LinkState::Disconnected;
                    ConnectionEvent {
                        status: ConnectionStatus::Closed,
                        code,
                        reason,
                    }
                }
                LinkEvent::Failed(reason) => {
                    inner.link = LinkState::Disconnected;
                    ConnectionEvent {
                        status: ConnectionStatus::Error,
                        code: None,
                        reason: Some(reason),
                    }
                }
            }
        };
        self.emit_connection(&conn_event);
    }

    fn handle_frame(&self, generation: u64, data: &[u8]) {
        {
            let inner = self.shared.inner.lock();
            if !self.is_current(generation) || inner.link != LinkState::Connected {
                return;
            }
        }
        let messages = self.shared.decoder.lock().on_frame(data);
        for msg in &messages {
            self.emit_data(msg);
        }
    }

    fn emit_connection(&self, event: &ConnectionEvent) {
        let cb = self.shared.on_connection.read().clone();
        if let Some(cb) = cb {
            if catch_unwind(AssertUnwindSafe(|| cb(self, event))).is_err() {
                error!(status = %event.status, "connection callback panicked");
            }
        }
    }

    fn emit_data(&self, msg: &DecodedMessage) {
        let cb = self.shared.on_data.read().clone();
        if let Some(cb) = cb {
            if catch_unwind(AssertUnwindSafe(|| cb(self, msg))).is_err() {
                error!(msg_type = %msg.msg_type, symbol = ?msg.symbol, "data callback panicked");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Write a control message. An unsubscribe-all also drops the cached
    /// state of that stream, whether or not the write succeeds.
    pub fn send(&self, req: &SubscriptionRequest) -> Result<(), NxError> {
        if req.is_unsubscribe_all() {
            let msg_type = req.kind.message_type();
            if msg_type.is_cached() {
                self.shared.decoder.lock().cache_mut().clear_type(msg_type);
            }
        }

        let line = req.to_line()?;
        let inner = self.shared.inner.lock();
        if inner.link != LinkState::Connected {
            warn!(kind = ?req.kind, "request dropped, stream not connected");
            return Err(NxError::NotConnected);
        }
        inner
            .conn
            .as_ref()
            .ok_or(NxError::NotConnected)?
            .send(line)
    }

    pub fn subscribe_l1<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::subscribe(StreamKind::L1, symbols))
    }

    pub fn subscribe_l1_snapshot<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::subscribe(StreamKind::L1Snapshot, symbols))
    }

    pub fn subscribe_depth<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::subscribe(StreamKind::Depth, symbols))
    }

    pub fn subscribe_depth_snapshot<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::subscribe(StreamKind::DepthSnapshot, symbols))
    }

    pub fn subscribe_greeks<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::subscribe(StreamKind::Greeks, symbols))
    }

    pub fn subscribe_greeks_snapshot<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::subscribe(StreamKind::GreeksSnapshot, symbols))
    }

    pub fn subscribe_ohlc<S: AsRef<str>>(
        &self,
        symbols: &[S],
        interval: &str,
    ) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::subscribe_ohlc(symbols, interval))
    }

    pub fn subscribe_events<S: AsRef<str>>(&self, events: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::subscribe_events(events))
    }

    /// Unsubscribe `symbols`; an empty slice unsubscribes all and clears the
    /// quote cache.
    pub fn unsubscribe_l1<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::unsubscribe(StreamKind::L1, symbols))
    }

    pub fn unsubscribe_l1_snapshot<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::unsubscribe(StreamKind::L1Snapshot, symbols))
    }

    pub fn unsubscribe_depth<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::unsubscribe(StreamKind::Depth, symbols))
    }

    pub fn unsubscribe_depth_snapshot<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::unsubscribe(StreamKind::DepthSnapshot, symbols))
    }

    /// Unsubscribe `symbols`; an empty slice unsubscribes all and clears the
    /// greeks cache.
    pub fn unsubscribe_greeks<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::unsubscribe(StreamKind::Greeks, symbols))
    }

    pub fn unsubscribe_greeks_snapshot<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::unsubscribe(StreamKind::GreeksSnapshot, symbols))
    }

    pub fn unsubscribe_ohlc<S: AsRef<str>>(
        &self,
        symbols: &[S],
        interval: &str,
    ) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::unsubscribe_ohlc(symbols, interval))
    }

    pub fn unsubscribe_events(&self) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::unsubscribe_events())
    }

    pub fn send_ping(&self) -> Result<(), NxError> {
        self.send(&SubscriptionRequest::ping())
    }

    // -----------------------------------------------------------------------
    // Cache access
    // -----------------------------------------------------------------------

    /// Current merged state of `symbol` for a cached message type.
    pub fn snapshot(&self, msg_type: MessageType, symbol: &str) -> Option<DecodedMessage> {
        self.shared.decoder.lock().cache().get(msg_type, symbol).cloned()
    }

    pub fn clear_cache(&self) {
        self.shared.decoder.lock().cache_mut().clear();
    }

    pub fn decode_stats(&self) -> DecodeStats {
        self.shared.decoder.lock().stats()
    }
}

fn upgrade(weak: &Weak<Shared>) -> Option<NxStream> {
    weak.upgrade().map(|shared| NxStream { shared })
}

fn current_runtime() -> Result<tokio::runtime::Handle, NxError> {
    tokio::runtime::Handle::try_current().map_err(|e| NxError::Runtime(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::testutil::{Body, frame};
    use std::sync::atomic::AtomicUsize;

    fn quote_frame(token: i32, ltp: i32) -> Vec<u8> {
        frame(&Body::new().u8(26, 1).i32(27, token).i32(29, ltp).packet(10))
    }

    #[test]
    fn endpoint_url_carries_token_and_version() {
        let stream = NxStream::new(StreamOptions::default());
        let url = stream.endpoint_url("key:secret").unwrap();
        assert_eq!(
            url,
            "wss://api.tradejini.com/v2.1/stream?token=key%3Asecret&version=3.1"
        );
    }

    #[test]
    fn invalid_base_url() {
        let stream = NxStream::new(StreamOptions {
            base_url: "not a url".into(),
            ..StreamOptions::default()
        });
        assert!(matches!(stream.endpoint_url("t"), Err(NxError::Config(_))));
    }

    #[test]
    fn requests_fail_when_not_connected() {
        let stream = NxStream::new(StreamOptions::default());
        assert_eq!(stream.state(), LinkState::Disconnected);
        assert!(matches!(stream.subscribe_l1(&["22_NSE"]), Err(NxError::NotConnected)));
        assert!(matches!(stream.send_ping(), Err(NxError::NotConnected)));
    }

    #[test]
    fn reconnect_without_token() {
        let stream = NxStream::new(StreamOptions::default());
        assert!(matches!(stream.reconnect(), Err(NxError::MissingAuthToken)));
    }

    #[test]
    fn connect_needs_a_runtime() {
        let stream = NxStream::new(StreamOptions::default());
        assert!(matches!(stream.connect("k:t"), Err(NxError::Runtime(_))));
    }

    #[test]
    fn unsubscribe_all_clears_matching_cache() {
        let stream = NxStream::new(StreamOptions::default());
        stream.handle_link(0, LinkEvent::Opened);
        stream.handle_frame(0, &quote_frame(22, 10_000));
        stream.handle_frame(0, &quote_frame(-1, 20_000));
        assert!(stream.snapshot(MessageType::Quote, "22_NSE").is_some());

        // Unsubscribing specific symbols keeps the cache.
        let _ = stream.unsubscribe_l1(&["22_NSE", "-1_NSE"]);
        assert!(stream.snapshot(MessageType::Quote, "22_NSE").is_some());

        let _ = stream.unsubscribe_greeks(&[] as &[&str]);
        assert!(stream.snapshot(MessageType::Quote, "-1_NSE").is_some());

        let _ = stream.unsubscribe_l1(&[] as &[&str]);
        assert!(stream.snapshot(MessageType::Quote, "22_NSE").is_none());
        assert!(stream.snapshot(MessageType::Quote, "-1_NSE").is_none());
    }

    #[test]
    fn data_callback_sees_merged_quotes() {
        let stream = NxStream::new(StreamOptions::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        stream.on_data(move |_, msg| sink.lock().push(msg.clone()));

        let snapshot = Body::new().u8(26, 1).i32(27, 5).i32(29, 100).i32(30, 90).packet(10);
        stream.handle_link(0, LinkEvent::Opened);
        stream.handle_frame(0, &frame(&snapshot));
        stream.handle_frame(0, &quote_frame(5, 110));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].get_f64("ltp"), Some(1.1));
        assert_eq!(seen[1].get_f64("open"), Some(0.9));
    }

    #[test]
    fn stale_session_events_are_ignored() {
        let stream = NxStream::new(StreamOptions::default());
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        stream.on_connection(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        stream.on_data({
            let c = count.clone();
            move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        stream.shared.generation.store(3, Ordering::SeqCst);
        stream.handle_link(2, LinkEvent::Opened);
        stream.handle_frame(2, &quote_frame(1, 1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(stream.state(), LinkState::Disconnected);

        stream.handle_link(3, LinkEvent::Opened);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(stream.is_connected());
    }

    #[test]
    fn frames_after_disconnect_are_dropped() {
        let stream = NxStream::new(StreamOptions::default());
        let delivered = Arc::new(AtomicUsize::new(0));
        let c = delivered.clone();
        stream.on_data(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        stream.handle_link(0, LinkEvent::Opened);
        stream.disconnect();
        // Frame already read off the socket before the session task saw the shutdown.
        stream.handle_frame(0, &quote_frame(7, 100));

        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert!(stream.snapshot(MessageType::Quote, "7_NSE").is_none());
        assert_eq!(stream.decode_stats().frames, 0);
    }

    #[test]
    fn frames_before_open_are_dropped() {
        let stream = NxStream::new(StreamOptions::default());
        stream.handle_frame(0, &quote_frame(7, 100));
        assert_eq!(stream.decode_stats().frames, 0);
    }

    #[test]
    fn callback_panic_is_contained() {
        let stream = NxStream::new(StreamOptions::default());
        stream.on_connection(|_, _| panic!("boom"));
        stream.on_data(|_, _| panic!("boom"));

        stream.handle_link(0, LinkEvent::Opened);
        stream.handle_frame(0, &quote_frame(1, 1));
        stream.handle_link(0, LinkEvent::Failed("reset".into()));

        assert_eq!(stream.state(), LinkState::Disconnected);
        assert_eq!(stream.decode_stats().messages, 1);
    }

    #[test]
    fn close_event_carries_code_and_reason() {
        let stream = NxStream::new(StreamOptions::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        stream.on_connection(move |_, e| sink.lock().push(e.clone()));

        stream.handle_link(0, LinkEvent::Opened);
        stream.handle_link(
            0,
            LinkEvent::Closed {
                code: Some(4001),
                reason: Some("Unauthorized Access".into()),
            },
        );

        let events = events.lock();
        assert_eq!(events[0].status, ConnectionStatus::Connected);
        assert_eq!(events[1].status, ConnectionStatus::Closed);
        assert_eq!(events[1].code, Some(4001));
        assert_eq!(events[1].reason.as_deref(), Some("Unauthorized Access"));
    }
}
