//! Decoded market messages, the records handed to data callbacks.
//!
//! The feed is tag/value based and sends only changed fields after an initial
//! snapshot, so a decoded message is a map from semantic key to value rather
//! than a fixed struct. The message type, the derived `token_segment` symbol
//! and the display precision sit beside the map.
//!
//! Serialized with serde, a message flattens to the familiar shape:
//!
//! ```json
//! {"msgType":"L1","symbol":"22_NSE","precision":2,"localTimeUs":..., "ltp":83920.55, "exchSeg":"NSE", ...}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Message type
// ---------------------------------------------------------------------------

/// Packet / message kind, keyed by the wire type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageType {
    /// Level-1 quote (code 10).
    #[serde(rename = "L1")]
    Quote,
    /// Five-level market depth (code 11).
    #[serde(rename = "L5")]
    Depth,
    /// OHLC bar (code 12).
    #[serde(rename = "OHLC")]
    Bar,
    /// Authentication result (code 13).
    #[serde(rename = "auth")]
    AuthStatus,
    /// Per-segment market status (code 14).
    #[serde(rename = "marketStatus")]
    MarketStatus,
    /// Account / broadcast message (code 15).
    #[serde(rename = "EVENTS")]
    Events,
    /// Liveness acknowledgement (code 16).
    #[serde(rename = "PING")]
    Ping,
    /// Option greeks (code 17).
    #[serde(rename = "greeks")]
    Greeks,
}

impl MessageType {
    /// Map a wire packet-type code to its message type.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            10 => Some(Self::Quote),
            11 => Some(Self::Depth),
            12 => Some(Self::Bar),
            13 => Some(Self::AuthStatus),
            14 => Some(Self::MarketStatus),
            15 => Some(Self::Events),
            16 => Some(Self::Ping),
            17 => Some(Self::Greeks),
            _ => None,
        }
    }

    /// Name used on the wire and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "L1",
            Self::Depth => "L5",
            Self::Bar => "OHLC",
            Self::AuthStatus => "auth",
            Self::MarketStatus => "marketStatus",
            Self::Events => "EVENTS",
            Self::Ping => "PING",
            Self::Greeks => "greeks",
        }
    }

    /// Whether messages of this type are merged into the snapshot cache.
    pub fn is_cached(self) -> bool {
        matches!(self, Self::Quote | Self::Greeks)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// One (price, quantity, order-count) entry of a depth ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DepthLevel {
    pub price: f64,
    pub qty: u32,
    #[serde(rename = "no")]
    pub orders: u32,
}

/// Trading status of one exchange segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentStatus {
    #[serde(rename = "exchSeg")]
    pub segment: String,
    #[serde(rename = "marketStatus")]
    pub status: u8,
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Integer passed through without scaling.
    Int(i64),
    /// Scaled price, percentage, or wire double.
    Float(f64),
    /// Segment name, bar interval, event text.
    Text(String),
    /// Epoch-seconds field converted to a timestamp.
    Time(DateTime<Utc>),
    /// Bid or ask ladder of a depth message.
    Levels(Vec<DepthLevel>),
    /// Market status entries.
    Statuses(Vec<SegmentStatus>),
}

impl FieldValue {
    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_levels(&self) -> Option<&[DepthLevel]> {
        match self {
            Self::Levels(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_statuses(&self) -> Option<&[SegmentStatus]> {
        match self {
            Self::Statuses(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DecodedMessage
// ---------------------------------------------------------------------------

/// Field map of a decoded message, keyed by the semantic key from the
/// packet layout tables (`"ltp"`, `"exchSeg"`, `"bid"`, ...).
pub type FieldMap = BTreeMap<&'static str, FieldValue>;

/// One decoded sub-packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    #[serde(rename = "msgType")]
    pub msg_type: MessageType,

    /// `token_segment`, present when both token and segment were decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// Display precision from the segment table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,

    /// Local receive time (µs since epoch). Zero until stamped by the pipeline.
    #[serde(rename = "localTimeUs")]
    pub local_time_us: u64,

    #[serde(flatten)]
    pub fields: FieldMap,
}

impl DecodedMessage {
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            symbol: None,
            precision: None,
            local_time_us: 0,
            fields: FieldMap::new(),
        }
    }

    pub fn insert(&mut self, key: &'static str, value: FieldValue) {
        self.fields.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(FieldValue::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_str)
    }

    /// Bid ladder of a depth message (empty for other types).
    pub fn bids(&self) -> &[DepthLevel] {
        self.get("bid").and_then(FieldValue::as_levels).unwrap_or(&[])
    }

    /// Ask ladder of a depth message (empty for other types).
    pub fn asks(&self) -> &[DepthLevel] {
        self.get("ask").and_then(FieldValue::as_levels).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_codes() {
        let names: Vec<_> = (10..=17u8)
            .map(|code| MessageType::from_code(code).unwrap().as_str())
            .collect();
        assert_eq!(
            names,
            ["L1", "L5", "OHLC", "auth", "marketStatus", "EVENTS", "PING", "greeks"]
        );
        assert!(MessageType::from_code(9).is_none());
        assert!(MessageType::from_code(18).is_none());
    }

    #[test]
    fn only_quote_and_greeks_are_cached() {
        assert!(MessageType::Quote.is_cached());
        assert!(MessageType::Greeks.is_cached());
        assert!(!MessageType::Depth.is_cached());
        assert!(!MessageType::Bar.is_cached());
    }

    #[test]
    fn serializes_flat() {
        let mut msg = DecodedMessage::new(MessageType::Quote);
        msg.symbol = Some("22_NSE".into());
        msg.precision = Some(2);
        msg.insert("ltp", FieldValue::Float(83920.55));
        msg.insert("exchSeg", FieldValue::Text("NSE".into()));
        msg.insert("vol", FieldValue::Int(1200));

        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["msgType"], "L1");
        assert_eq!(v["symbol"], "22_NSE");
        assert_eq!(v["precision"], 2);
        assert_eq!(v["ltp"], 83920.55);
        assert_eq!(v["exchSeg"], "NSE");
        assert_eq!(v["vol"], 1200);
    }

    #[test]
    fn depth_levels_serialize_with_wire_keys() {
        let level = DepthLevel {
            price: 101.5,
            qty: 10,
            orders: 2,
        };
        let v = serde_json::to_value(level).unwrap();
        assert_eq!(v["price"], 101.5);
        assert_eq!(v["qty"], 10);
        assert_eq!(v["no"], 2);
    }

    #[test]
    fn numeric_accessors() {
        let mut msg = DecodedMessage::new(MessageType::Quote);
        msg.insert("vol", FieldValue::Int(7));
        msg.insert("ltp", FieldValue::Float(1.5));
        assert_eq!(msg.get_f64("vol"), Some(7.0));
        assert_eq!(msg.get_i64("vol"), Some(7));
        assert_eq!(msg.get_i64("ltp"), None);
        assert!(msg.bids().is_empty());
    }
}
