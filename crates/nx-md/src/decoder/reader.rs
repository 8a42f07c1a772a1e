//! Tag/value reader over a sub-packet body.

use byteorder::{ByteOrder, LittleEndian};
use nx_core::MessageType;

use super::DecodeError;
use crate::field_spec::{FieldSpec, Wire, field_spec};

/// A value as read from the wire, before any role transform.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// Walks the `[tag][value]` pairs of one sub-packet body.
pub struct TagReader<'a> {
    msg_type: MessageType,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TagReader<'a> {
    pub fn new(msg_type: MessageType, buf: &'a [u8]) -> Self {
        Self {
            msg_type,
            buf,
            pos: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Read the next field. `text_len` overrides the width of a string field.
    ///
    /// Returns `None` at the end of the body. An unknown tag or a value that
    /// runs past the body is an error; the remaining bytes cannot be framed.
    pub fn next_field(
        &mut self,
        text_len: Option<usize>,
    ) -> Option<Result<(&'static FieldSpec, RawValue), DecodeError>> {
        if self.is_empty() {
            return None;
        }
        Some(self.read_field(text_len))
    }

    fn read_field(
        &mut self,
        text_len: Option<usize>,
    ) -> Result<(&'static FieldSpec, RawValue), DecodeError> {
        let tag = self.buf[self.pos];
        let spec = field_spec(self.msg_type, tag).ok_or(DecodeError::UnknownTag {
            msg_type: self.msg_type,
            tag,
        })?;
        self.pos += 1;

        let wire = match (spec.wire, text_len) {
            (Wire::Str(_), Some(n)) => Wire::Str(n),
            (w, _) => w,
        };

        let need = wire.width();
        let have = self.buf.len() - self.pos;
        if need > have {
            self.pos = self.buf.len();
            return Err(DecodeError::Truncated {
                key: spec.key,
                need,
                have,
            });
        }

        let bytes = &self.buf[self.pos..self.pos + need];
        self.pos += need;

        let value = match wire {
            Wire::U8 => RawValue::Int(bytes[0] as i64),
            Wire::U16 => RawValue::Int(LittleEndian::read_u16(bytes) as i64),
            Wire::I32 => RawValue::Int(LittleEndian::read_i32(bytes) as i64),
            Wire::U32 => RawValue::Int(LittleEndian::read_u32(bytes) as i64),
            Wire::F64 => RawValue::Float(LittleEndian::read_f64(bytes)),
            Wire::Str(_) => RawValue::Text(decode_text(bytes)),
        };
        Ok((spec, value))
    }
}

/// NUL-padded UTF-8; padding is stripped and invalid sequences replaced.
fn decode_text(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::testutil::Body;

    #[test]
    fn reads_widths_little_endian() {
        let body = Body::new()
            .u8(26, 2)
            .i32(27, -1)
            .u32(40, 4_000_000_000)
            .f64(41, 12.5);
        let mut r = TagReader::new(MessageType::Quote, &body.0);

        let (spec, v) = r.next_field(None).unwrap().unwrap();
        assert_eq!((spec.key, v), ("exchSeg", RawValue::Int(2)));
        let (_, v) = r.next_field(None).unwrap().unwrap();
        assert_eq!(v, RawValue::Int(-1));
        let (_, v) = r.next_field(None).unwrap().unwrap();
        assert_eq!(v, RawValue::Int(4_000_000_000));
        let (_, v) = r.next_field(None).unwrap().unwrap();
        assert_eq!(v, RawValue::Float(12.5));
        assert!(r.next_field(None).is_none());
    }

    #[test]
    fn unknown_tag() {
        let body = [200u8, 0, 0];
        let mut r = TagReader::new(MessageType::Quote, &body);
        assert_eq!(
            r.next_field(None).unwrap().unwrap_err(),
            DecodeError::UnknownTag {
                msg_type: MessageType::Quote,
                tag: 200
            }
        );
    }

    #[test]
    fn truncated_value_ends_the_body() {
        let body = [29u8, 1, 2];
        let mut r = TagReader::new(MessageType::Quote, &body);
        assert_eq!(
            r.next_field(None).unwrap().unwrap_err(),
            DecodeError::Truncated {
                key: "ltp",
                need: 4,
                have: 2
            }
        );
        assert!(r.next_field(None).is_none());
    }

    #[test]
    fn text_width_override_and_padding() {
        let body = Body::new().str(61, "halt", 8);
        let mut r = TagReader::new(MessageType::Events, &body.0);
        let (_, v) = r.next_field(Some(8)).unwrap().unwrap();
        assert_eq!(v, RawValue::Text("halt".into()));
        assert!(r.is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(decode_text(&[b'a', 0xff, b'b', 0, 0]), "a\u{fffd}b");
        assert_eq!(decode_text(&[0, 0]), "");
    }
}
