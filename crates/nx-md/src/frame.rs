//! Frame envelope and sub-packet splitting.
//!
//! # Frame layout (little-endian)
//!
//! | Offset | Size | Field        | Description                          |
//! |--------|------|--------------|--------------------------------------|
//! | 0      | 4    | totalLength  | i32, informational                   |
//! | 4      | 1    | version      | i8, only `1` is accepted             |
//! | 5      | 1    | compression  | i8, `0` = none, `100` = zlib         |
//! | 6      | ..   | payload      | concatenated sub-packets             |
//!
//! # Sub-packet layout
//!
//! | Offset | Size | Field       | Description                            |
//! |--------|------|-------------|----------------------------------------|
//! | 0      | 2    | length      | i16, includes these two bytes          |
//! | 2      | 1    | type        | packet type code (10–17)               |
//! | 3      | ..   | body        | `[tag][value]` pairs                   |

use std::borrow::Cow;
use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;

use crate::decoder::DecodeError;

/// Frame header size in bytes.
pub const FRAME_HEADER_LEN: usize = 6;
/// The only protocol version this client speaks.
pub const PROTOCOL_VERSION: i8 = 1;
/// Sub-packet header: length (2) + type (1).
pub const SUB_PACKET_HEADER_LEN: usize = 3;

const COMPRESSION_NONE: i8 = 0;
const COMPRESSION_ZLIB: i8 = 100;

/// Payload compression announced in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
}

impl Compression {
    pub fn from_code(code: i8) -> Result<Self, DecodeError> {
        match code {
            COMPRESSION_NONE => Ok(Self::None),
            COMPRESSION_ZLIB => Ok(Self::Zlib),
            other => Err(DecodeError::UnsupportedCompression(other)),
        }
    }
}

/// A parsed frame envelope borrowing its payload.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub declared_len: i32,
    pub version: i8,
    pub compression: Compression,
    pub payload: &'a [u8],
}

impl<'a> RawFrame<'a> {
    /// Parse the envelope. Rejects short frames, foreign versions and unknown
    /// compression codes.
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < FRAME_HEADER_LEN {
            return Err(DecodeError::FrameTooShort(data.len()));
        }

        let declared_len = LittleEndian::read_i32(&data[0..4]);
        let version = data[4] as i8;
        if version != PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let compression = Compression::from_code(data[5] as i8)?;

        Ok(Self {
            declared_len,
            version,
            compression,
            payload: &data[FRAME_HEADER_LEN..],
        })
    }

    /// The payload with compression removed.
    pub fn decompressed(&self) -> Result<Cow<'a, [u8]>, DecodeError> {
        match self.compression {
            Compression::None => Ok(Cow::Borrowed(self.payload)),
            Compression::Zlib => {
                let mut out = Vec::with_capacity(self.payload.len() * 4);
                ZlibDecoder::new(self.payload)
                    .read_to_end(&mut out)
                    .map_err(|e| DecodeError::Decompress(e.to_string()))?;
                Ok(Cow::Owned(out))
            }
        }
    }
}

/// One length-prefixed sub-packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubPacket<'a> {
    pub type_code: u8,
    /// Tag/value pairs following the type byte.
    pub body: &'a [u8],
}

/// Iterator over the sub-packets of a decompressed payload.
///
/// A non-positive length or a length running past the payload means the
/// rest of the payload cannot be framed: the iterator yields one error and
/// then ends. A packet too short to carry its type byte is reported and
/// skipped.
pub struct SubPackets<'a> {
    buf: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> SubPackets<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for SubPackets<'a> {
    type Item = Result<SubPacket<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.buf.len() {
            return None;
        }

        let remaining = self.buf.len() - self.pos;
        if remaining < 2 {
            self.done = true;
            return Some(Err(DecodeError::TrailingBytes(remaining)));
        }

        let declared = LittleEndian::read_i16(&self.buf[self.pos..self.pos + 2]);
        if declared <= 0 {
            self.done = true;
            return Some(Err(DecodeError::NonPositiveLength(declared)));
        }

        let len = declared as usize;
        if len > remaining {
            self.done = true;
            return Some(Err(DecodeError::PacketOverrun {
                declared: len,
                remaining,
            }));
        }

        let start = self.pos;
        self.pos += len;

        if len < SUB_PACKET_HEADER_LEN {
            return Some(Err(DecodeError::PacketTooShort(len)));
        }

        Some(Ok(SubPacket {
            type_code: self.buf[start + 2],
            body: &self.buf[start + SUB_PACKET_HEADER_LEN..start + len],
        }))
    }
}
