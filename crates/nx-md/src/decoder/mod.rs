//! Sub-packet decoding.
//!
//! [`decode_packet`] turns one sub-packet into a [`DecodedMessage`]. Each
//! packet type has its own module; they share the tag/value [`reader`] and
//! the instrument field handling in [`quote`].
//!
//! Decoding is a pure function of the bytes plus [`DecodeOptions`]. Errors
//! are scoped to the sub-packet that produced them: the caller logs and
//! moves on to the next one.

mod depth;
mod events;
mod quote;
pub mod reader;
mod status;

use nx_core::{DecodedMessage, MessageType};
use thiserror::Error;

use crate::frame::SubPacket;

/// Errors raised while decoding a frame or sub-packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(i8),

    #[error("unsupported compression algorithm {0}")]
    UnsupportedCompression(i8),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("sub-packet declares non-positive length {0}")]
    NonPositiveLength(i16),

    #[error("sub-packet length {declared} exceeds remaining {remaining} bytes")]
    PacketOverrun { declared: usize, remaining: usize },

    #[error("sub-packet too short: {0} bytes")]
    PacketTooShort(usize),

    #[error("{0} trailing bytes after last sub-packet")]
    TrailingBytes(usize),

    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("unknown tag {tag} in {msg_type} packet")]
    UnknownTag { msg_type: MessageType, tag: u8 },

    #[error("truncated value for {key}: need {need} bytes, have {have}")]
    Truncated {
        key: &'static str,
        need: usize,
        have: usize,
    },

    #[error("unknown exchange segment {0}")]
    UnknownSegment(u8),

    #[error("{0} packet without token or segment")]
    MissingIdentity(MessageType),

    #[error("invalid epoch time {0}")]
    InvalidTime(i64),

    #[error("depth ladder declares {declared} levels but carries {bids} bids")]
    LadderShort { declared: usize, bids: usize },

    #[error("depth ladder has an incomplete level")]
    LadderIncomplete,

    #[error("market status entry is incomplete")]
    StatusIncomplete,
}

impl DecodeError {
    /// Whether the error ends decoding of the rest of the frame.
    pub fn is_frame_fatal(&self) -> bool {
        matches!(
            self,
            Self::FrameTooShort(_)
                | Self::UnsupportedVersion(_)
                | Self::UnsupportedCompression(_)
                | Self::Decompress(_)
                | Self::NonPositiveLength(_)
                | Self::PacketOverrun { .. }
                | Self::TrailingBytes(_)
        )
    }
}

/// Decoder behavior switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// Reject sub-packets whose exchange segment is not in the scaling table.
    /// When off, their prices pass through unscaled.
    pub strict_segments: bool,
}

/// Decode one sub-packet.
pub fn decode_packet(
    packet: &SubPacket<'_>,
    opts: &DecodeOptions,
) -> Result<DecodedMessage, DecodeError> {
    let msg_type = MessageType::from_code(packet.type_code)
        .ok_or(DecodeError::UnknownPacketType(packet.type_code))?;

    match msg_type {
        MessageType::Quote | MessageType::Greeks | MessageType::Bar => {
            quote::decode(msg_type, packet.body, opts)
        }
        MessageType::Depth => depth::decode(packet.body, opts),
        MessageType::MarketStatus => status::decode_market_status(packet.body, opts),
        MessageType::AuthStatus | MessageType::Ping => status::decode_simple(msg_type, packet.body),
        MessageType::Events => events::decode(packet.body),
    }
}

/// Builders for wire bytes, shared by the decoder tests.
#[cfg(test)]
pub(crate) mod testutil {
    use crate::frame::{FRAME_HEADER_LEN, PROTOCOL_VERSION, SUB_PACKET_HEADER_LEN};

    /// Tag/value body builder.
    #[derive(Default)]
    pub struct Body(pub Vec<u8>);

    impl Body {
        pub fn new() -> Self {
            Self::default()
        }
        pub fn u8(mut self, tag: u8, v: u8) -> Self {
            self.0.push(tag);
            self.0.push(v);
            self
        }
        pub fn u16(mut self, tag: u8, v: u16) -> Self {
            self.0.push(tag);
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }
        pub fn i32(mut self, tag: u8, v: i32) -> Self {
            self.0.push(tag);
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }
        pub fn u32(mut self, tag: u8, v: u32) -> Self {
            self.0.push(tag);
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }
        pub fn f64(mut self, tag: u8, v: f64) -> Self {
            self.0.push(tag);
            self.0.extend_from_slice(&v.to_le_bytes());
            self
        }
        pub fn str(mut self, tag: u8, s: &str, width: usize) -> Self {
            self.0.push(tag);
            let mut bytes = s.as_bytes().to_vec();
            bytes.resize(width, 0);
            self.0.extend_from_slice(&bytes);
            self
        }
        pub fn raw(mut self, bytes: &[u8]) -> Self {
            self.0.extend_from_slice(bytes);
            self
        }
        pub fn packet(&self, type_code: u8) -> Vec<u8> {
            let mut out = ((self.0.len() + SUB_PACKET_HEADER_LEN) as i16)
                .to_le_bytes()
                .to_vec();
            out.push(type_code);
            out.extend_from_slice(&self.0);
            out
        }
    }

    /// Wrap a payload in an uncompressed frame.
    pub fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = ((FRAME_HEADER_LEN + payload.len()) as i32)
            .to_le_bytes()
            .to_vec();
        out.push(PROTOCOL_VERSION as u8);
        out.push(0);
        out.extend_from_slice(payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::Body;
    use super::*;

    fn packet(type_code: u8, body: &[u8]) -> SubPacket<'_> {
        SubPacket { type_code, body }
    }

    #[test]
    fn unknown_packet_type() {
        let err = decode_packet(&packet(99, &[]), &DecodeOptions::default()).unwrap_err();
        assert_eq!(err, DecodeError::UnknownPacketType(99));
        assert!(!err.is_frame_fatal());
    }

    #[test]
    fn dispatches_by_type() {
        let opts = DecodeOptions::default();
        let body = Body::new().u8(62, 1);
        let msg = decode_packet(&packet(16, &body.0), &opts).unwrap();
        assert_eq!(msg.msg_type, MessageType::Ping);

        let body = Body::new().u8(26, 1).i32(27, 5).f64(65, 0.5);
        let msg = decode_packet(&packet(17, &body.0), &opts).unwrap();
        assert_eq!(msg.msg_type, MessageType::Greeks);
        assert_eq!(msg.symbol.as_deref(), Some("5_NSE"));
    }

    #[test]
    fn frame_fatal_classification() {
        assert!(DecodeError::NonPositiveLength(0).is_frame_fatal());
        assert!(DecodeError::Decompress("x".into()).is_frame_fatal());
        assert!(!DecodeError::LadderIncomplete.is_frame_fatal());
        assert!(!DecodeError::MissingIdentity(MessageType::Quote).is_frame_fatal());
    }
}
