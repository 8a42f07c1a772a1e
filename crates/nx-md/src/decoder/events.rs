//! Events packets: free-text broadcast messages.
//!
//! `nLen` gives the byte width of the `message` string that follows it.
//! Without a preceding `nLen` the default width from the field table applies.

use nx_core::{DecodedMessage, FieldValue, MessageType};

use super::DecodeError;
use super::reader::{RawValue, TagReader};
use crate::field_spec::FieldRole;

pub(super) fn decode(body: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let mut reader = TagReader::new(MessageType::Events, body);
    let mut msg = DecodedMessage::new(MessageType::Events);
    let mut text_len: Option<usize> = None;

    while let Some(field) = reader.next_field(text_len) {
        let (spec, value) = field?;
        match (spec.role, value) {
            (FieldRole::Length, RawValue::Int(n)) => {
                text_len = Some(n.max(0) as usize);
                msg.insert(spec.key, FieldValue::Int(n));
            }
            (_, RawValue::Text(s)) => msg.insert(spec.key, FieldValue::Text(s)),
            (_, RawValue::Int(v)) => msg.insert(spec.key, FieldValue::Int(v)),
            (_, RawValue::Float(v)) => msg.insert(spec.key, FieldValue::Float(v)),
        }
    }
    Ok(msg)
}
