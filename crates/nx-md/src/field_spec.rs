//! Static field layout tables, one per packet type.
//!
//! Every sub-packet body is a run of `[tag u8][value]` pairs. The tag alone
//! does not say how wide the value is or what it means; that is fixed per
//! packet type by the tables below. A tag missing from its packet's table
//! cannot be skipped (its width is unknown), so the decoder abandons the
//! sub-packet.
//!
//! All multi-byte values are little-endian.

use nx_core::MessageType;

/// Binary layout of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    U8,
    U16,
    I32,
    U32,
    F64,
    /// Fixed-width, NUL-padded UTF-8 string.
    Str(usize),
}

impl Wire {
    /// Byte width of the value.
    pub const fn width(self) -> usize {
        match self {
            Wire::U8 => 1,
            Wire::U16 => 2,
            Wire::I32 | Wire::U32 => 4,
            Wire::F64 => 8,
            Wire::Str(n) => n,
        }
    }
}

/// How a decoded raw value turns into a field of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Stored as read.
    Plain,
    /// Scaled integer, divided by the segment divisor.
    Price,
    /// Scaled integer, always divided by 100.
    Percent,
    /// Epoch seconds, converted to a UTC timestamp.
    EpochTime,
    /// Exchange segment code; resolves the scaling for the packet.
    Segment,
    /// Instrument token; with the segment forms the symbol.
    Token,
    /// Precision as sent by the feed; the segment table value takes priority.
    Precision,
    /// Number of levels per side of a depth ladder.
    LevelCount,
    /// Length prefix (byte width of the following string, or list length).
    Length,
}

/// Layout and meaning of one tag within one packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub tag: u8,
    pub key: &'static str,
    pub wire: Wire,
    pub role: FieldRole,
}

const fn f(tag: u8, key: &'static str, wire: Wire, role: FieldRole) -> FieldSpec {
    FieldSpec {
        tag,
        key,
        wire,
        role,
    }
}

use FieldRole::*;
use Wire::*;

/// Default width of the events text field when no length prefix precedes it.
pub const DEFAULT_EVENT_TEXT_LEN: usize = 100;

/// Quote (L1), type 10.
pub static QUOTE_FIELDS: &[FieldSpec] = &[
    f(26, "exchSeg", U8, Segment),
    f(27, "token", I32, Token),
    f(28, "precision", U8, Precision),
    f(29, "ltp", I32, Price),
    f(30, "open", I32, Price),
    f(31, "high", I32, Price),
    f(32, "low", I32, Price),
    f(33, "close", I32, Price),
    f(34, "chng", I32, Price),
    f(35, "chngPer", I32, Percent),
    f(36, "atp", I32, Price),
    f(37, "yHigh", I32, Price),
    f(38, "yLow", I32, Price),
    f(39, "ltq", U32, Plain),
    f(40, "vol", U32, Plain),
    f(41, "ttv", F64, Plain),
    f(42, "ucl", I32, Price),
    f(43, "lcl", I32, Price),
    f(44, "OI", U32, Plain),
    f(45, "OIChngPer", I32, Percent),
    f(46, "ltt", I32, EpochTime),
    f(49, "bidPrice", I32, Price),
    f(50, "qty", U32, Plain),
    f(51, "no", U32, Plain),
    f(52, "askPrice", I32, Price),
    f(53, "qty", U32, Plain),
    f(54, "no", U32, Plain),
    f(55, "nDepth", U8, Plain),
    f(56, "nLen", U16, Plain),
    f(58, "prevOI", U32, Plain),
    f(59, "dayHighOI", U32, Plain),
    f(60, "dayLowOI", U32, Plain),
    f(70, "spotPrice", I32, Price),
    f(71, "dayClose", I32, Price),
    f(74, "vwap", I32, Price),
];

/// Depth (L5), type 11. Tags 49–54 are ladder entries once `nDepth` is seen.
pub static DEPTH_FIELDS: &[FieldSpec] = &[
    f(26, "exchSeg", U8, Segment),
    f(27, "token", I32, Token),
    f(28, "precision", U8, Precision),
    f(47, "totBuyQty", U32, Plain),
    f(48, "totSellQty", U32, Plain),
    f(49, "price", I32, Price),
    f(50, "qty", U32, Plain),
    f(51, "no", U32, Plain),
    f(52, "price", I32, Price),
    f(53, "qty", U32, Plain),
    f(54, "no", U32, Plain),
    f(55, "nDepth", U8, LevelCount),
];

/// Bar (OHLC), type 12.
pub static BAR_FIELDS: &[FieldSpec] = &[
    f(26, "exchSeg", U8, Segment),
    f(27, "token", I32, Token),
    f(28, "precision", U8, Precision),
    f(30, "open", I32, Price),
    f(31, "high", I32, Price),
    f(32, "low", I32, Price),
    f(33, "close", I32, Price),
    f(40, "vol", U32, Plain),
    f(46, "time", I32, EpochTime),
    f(74, "vwap", I32, Price),
    f(75, "type", Str(4), Plain),
    f(76, "minuteOi", U32, Plain),
];

/// Auth status, type 13.
pub static AUTH_FIELDS: &[FieldSpec] = &[f(25, "auth_status", U8, Plain)];

/// Market status, type 14.
pub static MARKET_STATUS_FIELDS: &[FieldSpec] = &[
    f(56, "nLen", U16, Length),
    f(26, "exchSeg", U8, Segment),
    f(57, "marketStatus", U8, Plain),
];

/// Events, type 15. The width of `message` comes from the preceding `nLen`.
pub static EVENT_FIELDS: &[FieldSpec] = &[
    f(56, "nLen", U16, Length),
    f(61, "message", Str(DEFAULT_EVENT_TEXT_LEN), Plain),
];

/// Ping acknowledgement, type 16.
pub static PING_FIELDS: &[FieldSpec] = &[f(62, "pong", U8, Plain)];

/// Option greeks, type 17.
pub static GREEKS_FIELDS: &[FieldSpec] = &[
    f(26, "exchSeg", U8, Segment),
    f(27, "token", I32, Token),
    f(63, "itm", F64, Plain),
    f(64, "iv", F64, Plain),
    f(65, "delta", F64, Plain),
    f(66, "gamma", F64, Plain),
    f(67, "theta", F64, Plain),
    f(68, "rho", F64, Plain),
    f(69, "vega", F64, Plain),
    f(72, "highiv", F64, Plain),
    f(73, "lowiv", F64, Plain),
];

/// Field table for a packet type.
pub fn fields_for(msg_type: MessageType) -> &'static [FieldSpec] {
    match msg_type {
        MessageType::Quote => QUOTE_FIELDS,
        MessageType::Depth => DEPTH_FIELDS,
        MessageType::Bar => BAR_FIELDS,
        MessageType::AuthStatus => AUTH_FIELDS,
        MessageType::MarketStatus => MARKET_STATUS_FIELDS,
        MessageType::Events => EVENT_FIELDS,
        MessageType::Ping => PING_FIELDS,
        MessageType::Greeks => GREEKS_FIELDS,
    }
}

/// Look up the spec for `(packet type, tag)`.
#[inline]
pub fn field_spec(msg_type: MessageType, tag: u8) -> Option<&'static FieldSpec> {
    fields_for(msg_type).iter().find(|s| s.tag == tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [MessageType; 8] = [
        MessageType::Quote,
        MessageType::Depth,
        MessageType::Bar,
        MessageType::AuthStatus,
        MessageType::MarketStatus,
        MessageType::Events,
        MessageType::Ping,
        MessageType::Greeks,
    ];

    #[test]
    fn tags_unique_per_packet_type() {
        for t in ALL {
            let fields = fields_for(t);
            for (i, a) in fields.iter().enumerate() {
                assert!(
                    fields[i + 1..].iter().all(|b| b.tag != a.tag),
                    "duplicate tag {} in {t}",
                    a.tag
                );
            }
        }
    }

    #[test]
    fn lookup_is_per_packet_type() {
        let ltp = field_spec(MessageType::Quote, 29).unwrap();
        assert_eq!(ltp.key, "ltp");
        assert_eq!(ltp.role, FieldRole::Price);
        assert_eq!(ltp.wire.width(), 4);

        // Tag 29 means nothing in a depth packet.
        assert!(field_spec(MessageType::Depth, 29).is_none());
        assert_eq!(field_spec(MessageType::Depth, 55).unwrap().role, FieldRole::LevelCount);
        assert_eq!(field_spec(MessageType::Quote, 55).unwrap().role, FieldRole::Plain);
    }

    #[test]
    fn widths() {
        assert_eq!(Wire::U8.width(), 1);
        assert_eq!(Wire::U16.width(), 2);
        assert_eq!(Wire::F64.width(), 8);
        assert_eq!(field_spec(MessageType::Bar, 75).unwrap().wire, Wire::Str(4));
        assert_eq!(
            field_spec(MessageType::Events, 61).unwrap().wire.width(),
            DEFAULT_EVENT_TEXT_LEN
        );
    }

    #[test]
    fn every_instrument_packet_has_segment_and_token() {
        for t in [MessageType::Quote, MessageType::Depth, MessageType::Bar, MessageType::Greeks] {
            let fields = fields_for(t);
            assert!(fields.iter().any(|s| s.role == FieldRole::Segment));
            assert!(fields.iter().any(|s| s.role == FieldRole::Token));
        }
    }
}
