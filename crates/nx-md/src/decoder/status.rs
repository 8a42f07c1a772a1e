//! Market status, auth and ping packets.

use nx_core::{DecodedMessage, FieldValue, MessageType, SegmentStatus};

use super::quote::{resolve_segment, segment_name};
use super::reader::{RawValue, TagReader};
use super::{DecodeError, DecodeOptions};
use crate::field_spec::FieldRole;

/// Market status: a list of `(exchSeg, marketStatus)` pairs under `"status"`.
pub(super) fn decode_market_status(
    body: &[u8],
    opts: &DecodeOptions,
) -> Result<DecodedMessage, DecodeError> {
    let mut reader = TagReader::new(MessageType::MarketStatus, body);
    let mut msg = DecodedMessage::new(MessageType::MarketStatus);
    let mut entries = Vec::new();
    let mut segment: Option<String> = None;
    let mut status: Option<u8> = None;

    while let Some(field) = reader.next_field(None) {
        let (spec, value) = field?;
        let v = value.as_int().unwrap_or_default();
        match spec.role {
            FieldRole::Length => {
                entries.reserve(v.max(0) as usize);
                continue;
            }
            FieldRole::Segment => {
                if segment.replace(segment_name(resolve_segment(v as u8, opts)?)).is_some() {
                    return Err(DecodeError::StatusIncomplete);
                }
            }
            _ => {
                if status.replace(v as u8).is_some() {
                    return Err(DecodeError::StatusIncomplete);
                }
            }
        }
        if segment.is_some() && status.is_some() {
            if let (Some(segment), Some(status)) = (segment.take(), status.take()) {
                entries.push(SegmentStatus { segment, status });
            }
        }
    }

    if segment.is_some() || status.is_some() {
        return Err(DecodeError::StatusIncomplete);
    }
    msg.insert("status", FieldValue::Statuses(entries));
    Ok(msg)
}

/// Auth status and ping: a single integer field.
pub(super) fn decode_simple(
    msg_type: MessageType,
    body: &[u8],
) -> Result<DecodedMessage, DecodeError> {
    let mut reader = TagReader::new(msg_type, body);
    let mut msg = DecodedMessage::new(msg_type);
    while let Some(field) = reader.next_field(None) {
        let (spec, value) = field?;
        if let RawValue::Int(v) = value {
            msg.insert(spec.key, FieldValue::Int(v));
        }
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::testutil::Body;

    #[test]
    fn market_status_list() {
        let body = Body::new()
            .u16(56, 3)
            .u8(26, 1)
            .u8(57, 1)
            .u8(26, 3)
            .u8(57, 2)
            .u8(57, 0)
            .u8(26, 8);
        let msg = decode_market_status(&body.0, &DecodeOptions::default()).unwrap();
        let status = msg.get("status").unwrap().as_statuses().unwrap();
        assert_eq!(status.len(), 3);
        assert_eq!(
            status[0],
            SegmentStatus {
                segment: "NSE".into(),
                status: 1
            }
        );
        assert_eq!(status[1].segment, "NFO");
        assert_eq!(status[2].segment, "MCX");
        assert_eq!(status[2].status, 0);
        assert!(msg.symbol.is_none());
    }

    #[test]
    fn market_status_dangling_entry() {
        let body = Body::new().u16(56, 1).u8(26, 1);
        assert_eq!(
            decode_market_status(&body.0, &DecodeOptions::default()).unwrap_err(),
            DecodeError::StatusIncomplete
        );
    }

    #[test]
    fn market_status_unknown_segment() {
        let body = Body::new().u16(56, 1).u8(26, 77).u8(57, 1);
        let msg = decode_market_status(&body.0, &DecodeOptions::default()).unwrap();
        assert_eq!(msg.get("status").unwrap().as_statuses().unwrap()[0].segment, "77");

        let strict = DecodeOptions {
            strict_segments: true,
        };
        assert_eq!(
            decode_market_status(&body.0, &strict).unwrap_err(),
            DecodeError::UnknownSegment(77)
        );
    }

    #[test]
    fn auth_and_ping() {
        let body = Body::new().u8(25, 1);
        let msg = decode_simple(MessageType::AuthStatus, &body.0).unwrap();
        assert_eq!(msg.msg_type, MessageType::AuthStatus);
        assert_eq!(msg.get_i64("auth_status"), Some(1));

        let body = Body::new().u8(62, 1);
        let msg = decode_simple(MessageType::Ping, &body.0).unwrap();
        assert_eq!(msg.get_i64("pong"), Some(1));
    }
}
