//! Outbound control messages.
//!
//! Every request is one JSON object followed by `"\n"` on the feed socket:
//!
//! ```json
//! {"type":"L1","action":"sub","tokens":[{"t":"22_NSE"},{"t":"-1_NSE"}]}
//! {"type":"OHLC","action":"sub","tokens":[{"t":"22_NSE"}],"chartInterval":"1M"}
//! {"type":"L1","action":"unsub"}
//! {"type":"PING"}
//! ```
//!
//! An unsubscribe without tokens unsubscribes every symbol of that kind.

use nx_core::MessageType;
use serde::Serialize;

use nx_core::error::NxError;

/// Stream kind named in the `type` field of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StreamKind {
    #[serde(rename = "L1")]
    L1,
    #[serde(rename = "L1S")]
    L1Snapshot,
    #[serde(rename = "L5")]
    Depth,
    #[serde(rename = "L5S")]
    DepthSnapshot,
    #[serde(rename = "greeks")]
    Greeks,
    #[serde(rename = "greeks-snapshot")]
    GreeksSnapshot,
    #[serde(rename = "event")]
    Events,
    #[serde(rename = "OHLC")]
    Ohlc,
    #[serde(rename = "PING")]
    Ping,
}

impl StreamKind {
    /// Message type the feed answers this stream with.
    pub fn message_type(self) -> MessageType {
        match self {
            Self::L1 | Self::L1Snapshot => MessageType::Quote,
            Self::Depth | Self::DepthSnapshot => MessageType::Depth,
            Self::Greeks | Self::GreeksSnapshot => MessageType::Greeks,
            Self::Events => MessageType::Events,
            Self::Ohlc => MessageType::Bar,
            Self::Ping => MessageType::Ping,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Sub,
    Unsub,
}

/// One `{"t": "token_segment"}` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRef {
    pub t: String,
}

/// A subscription control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "type")]
    pub kind: StreamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<TokenRef>,
    #[serde(rename = "chartInterval", skip_serializing_if = "Option::is_none")]
    pub chart_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,
}

impl SubscriptionRequest {
    fn new<S: AsRef<str>>(kind: StreamKind, action: Action, tokens: &[S]) -> Self {
        Self {
            kind,
            action: Some(action),
            tokens: tokens
                .iter()
                .map(|t| TokenRef {
                    t: t.as_ref().to_string(),
                })
                .collect(),
            chart_interval: None,
            events: None,
        }
    }

    pub fn subscribe<S: AsRef<str>>(kind: StreamKind, tokens: &[S]) -> Self {
        Self::new(kind, Action::Sub, tokens)
    }

    /// Unsubscribe `tokens`, or every symbol of `kind` when empty.
    pub fn unsubscribe<S: AsRef<str>>(kind: StreamKind, tokens: &[S]) -> Self {
        Self::new(kind, Action::Unsub, tokens)
    }

    pub fn subscribe_ohlc<S: AsRef<str>>(tokens: &[S], interval: &str) -> Self {
        Self::subscribe(StreamKind::Ohlc, tokens).with_interval(interval)
    }

    pub fn unsubscribe_ohlc<S: AsRef<str>>(tokens: &[S], interval: &str) -> Self {
        Self::unsubscribe(StreamKind::Ohlc, tokens).with_interval(interval)
    }

    pub fn subscribe_events<S: AsRef<str>>(events: &[S]) -> Self {
        let mut req = Self::new(StreamKind::Events, Action::Sub, &[] as &[&str]);
        req.events = Some(events.iter().map(|e| e.as_ref().to_string()).collect());
        req
    }

    pub fn unsubscribe_events() -> Self {
        Self::new(StreamKind::Events, Action::Unsub, &[] as &[&str])
    }

    pub fn ping() -> Self {
        Self {
            kind: StreamKind::Ping,
            action: None,
            tokens: Vec::new(),
            chart_interval: None,
            events: None,
        }
    }

    pub fn with_interval(mut self, interval: &str) -> Self {
        self.chart_interval = Some(interval.to_string());
        self
    }

    /// Whether this request drops every subscription of its kind.
    pub fn is_unsubscribe_all(&self) -> bool {
        self.action == Some(Action::Unsub) && self.tokens.is_empty()
    }

    /// The `token_segment` ids addressed by this request.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.t.as_str())
    }

    /// Line-delimited JSON encoding written to the socket.
    pub fn to_line(&self) -> Result<String, NxError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
