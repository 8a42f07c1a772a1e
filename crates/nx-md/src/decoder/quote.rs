//! Instrument packets: quote (L1), greeks and OHLC bars.
//!
//! All three carry a segment + token identity and a flat set of fields.
//! [`Instrument`] holds the per-field transforms and is reused by the depth
//! decoder for the fields outside its ladder.
//!
//! Prices are kept raw until the whole body is read, so the segment may
//! appear anywhere in the packet.

use nx_core::time_util::epoch_secs_to_utc;
use nx_core::{DecodedMessage, FieldValue, MessageType, SegmentInfo, make_symbol, segment_info};
use tracing::warn;

use super::reader::{RawValue, TagReader};
use super::{DecodeError, DecodeOptions};
use crate::field_spec::{FieldRole, FieldSpec};

/// Resolved exchange segment of a packet.
#[derive(Debug, Clone, Copy)]
pub(super) enum Segment {
    Known(&'static SegmentInfo),
    Unknown(u8),
}

/// Field accumulator for one instrument packet.
pub(super) struct Instrument {
    msg: DecodedMessage,
    segment: Option<Segment>,
    token: Option<i64>,
    wire_precision: Option<u8>,
    pending_prices: Vec<(&'static str, i64)>,
}

impl Instrument {
    pub(super) fn new(msg_type: MessageType) -> Self {
        Self {
            msg: DecodedMessage::new(msg_type),
            segment: None,
            token: None,
            wire_precision: None,
            pending_prices: Vec::new(),
        }
    }

    pub(super) fn segment(&self) -> Option<Segment> {
        self.segment
    }

    /// Apply one decoded field according to its role.
    pub(super) fn accept(
        &mut self,
        spec: &'static FieldSpec,
        value: RawValue,
        opts: &DecodeOptions,
    ) -> Result<(), DecodeError> {
        match (spec.role, value) {
            (FieldRole::Segment, RawValue::Int(code)) => {
                let code = code as u8;
                let segment = resolve_segment(code, opts)?;
                self.msg.insert(spec.key, FieldValue::Text(segment_name(segment)));
                self.segment = Some(segment);
            }
            (FieldRole::Token, RawValue::Int(token)) => {
                self.token = Some(token);
                self.msg.insert(spec.key, FieldValue::Int(token));
            }
            (FieldRole::Precision, RawValue::Int(p)) => {
                self.wire_precision = Some(p as u8);
            }
            (FieldRole::Price, RawValue::Int(raw)) => {
                self.pending_prices.push((spec.key, raw));
            }
            (FieldRole::Percent, RawValue::Int(raw)) => {
                self.msg.insert(spec.key, FieldValue::Float(raw as f64 / 100.0));
            }
            (FieldRole::EpochTime, RawValue::Int(secs)) => {
                let t = epoch_secs_to_utc(secs).ok_or(DecodeError::InvalidTime(secs))?;
                self.msg.insert(spec.key, FieldValue::Time(t));
            }
            (_, value) => self.msg.insert(spec.key, plain(value)),
        }
        Ok(())
    }

    /// Scale deferred prices and derive symbol and precision.
    pub(super) fn finish(mut self) -> Result<DecodedMessage, DecodeError> {
        let msg_type = self.msg.msg_type;
        let (Some(segment), Some(token)) = (self.segment, self.token) else {
            return Err(DecodeError::MissingIdentity(msg_type));
        };

        for (key, raw) in self.pending_prices.drain(..) {
            self.msg.insert(key, scale(segment, raw));
        }

        self.msg.symbol = Some(make_symbol(token, &segment_name(segment)));
        self.msg.precision = match segment {
            Segment::Known(info) => Some(info.precision),
            Segment::Unknown(_) => self.wire_precision,
        };
        Ok(self.msg)
    }
}

pub(super) fn resolve_segment(code: u8, opts: &DecodeOptions) -> Result<Segment, DecodeError> {
    match segment_info(code) {
        Some(info) => Ok(Segment::Known(info)),
        None if opts.strict_segments => Err(DecodeError::UnknownSegment(code)),
        None => {
            warn!(code, "unknown exchange segment, prices left unscaled");
            Ok(Segment::Unknown(code))
        }
    }
}

pub(super) fn segment_name(segment: Segment) -> String {
    match segment {
        Segment::Known(info) => info.name.to_string(),
        Segment::Unknown(code) => code.to_string(),
    }
}

/// Price under the segment's divisor; raw integer for unknown segments.
pub(super) fn scale(segment: Segment, raw: i64) -> FieldValue {
    match segment {
        Segment::Known(info) => FieldValue::Float(info.scale(raw)),
        Segment::Unknown(_) => FieldValue::Int(raw),
    }
}

fn plain(value: RawValue) -> FieldValue {
    match value {
        RawValue::Int(v) => FieldValue::Int(v),
        RawValue::Float(v) => FieldValue::Float(v),
        RawValue::Text(s) => FieldValue::Text(s),
    }
}

pub(super) fn decode(
    msg_type: MessageType,
    body: &[u8],
    opts: &DecodeOptions,
) -> Result<DecodedMessage, DecodeError> {
    let mut reader = TagReader::new(msg_type, body);
    let mut inst = Instrument::new(msg_type);
    while let Some(field) = reader.next_field(None) {
        let (spec, value) = field?;
        inst.accept(spec, value, opts)?;
    }
    inst.finish()
}
