//! Frame layout shared by every message on the wire.
//!
//! ```text
//! [Magic(4)] [Version(1)] [Format(1)] [Length(4, BE)] [Payload(Length)]
//! ```
//!
//! The header is validated byte by byte as it arrives: a wrong magic byte,
//! version or format is reported as soon as it is visible, without waiting for
//! the rest of the header.

use crate::config::{MAGIC_BYTES, PROTOCOL_VERSION};
use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use bytes::{BufMut, BytesMut};

/// Size of the fixed frame header in bytes
pub const HEADER_SIZE: usize = 10;

const VERSION_OFFSET: usize = 4;
const FORMAT_OFFSET: usize = 5;
const LENGTH_OFFSET: usize = 6;

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub format: SerializationFormat,
    pub payload_len: usize,
}

impl FrameHeader {
    /// Inspect the front of `buf`.
    ///
    /// Returns `Ok(None)` while the header is incomplete but everything seen so
    /// far is valid. Any byte that contradicts the layout is an error.
    pub fn parse(buf: &[u8], max_payload: usize) -> Result<Option<Self>> {
        let magic_seen = buf.len().min(MAGIC_BYTES.len());
        if buf[..magic_seen] != MAGIC_BYTES[..magic_seen] {
            return Err(ProtocolError::InvalidHeader);
        }

        if let Some(&version) = buf.get(VERSION_OFFSET) {
            if version != PROTOCOL_VERSION {
                return Err(ProtocolError::UnsupportedVersion(version));
            }
        }

        if let Some(&format_byte) = buf.get(FORMAT_OFFSET) {
            if SerializationFormat::from_byte(format_byte).is_none() {
                return Err(ProtocolError::UnsupportedFormat(format_byte));
            }
        }

        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let format = SerializationFormat::from_byte(buf[FORMAT_OFFSET])
            .ok_or(ProtocolError::UnsupportedFormat(buf[FORMAT_OFFSET]))?;
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[LENGTH_OFFSET..HEADER_SIZE]);
        let payload_len = u32::from_be_bytes(len_bytes) as usize;

        if payload_len > max_payload {
            return Err(ProtocolError::OversizedPacket(payload_len));
        }

        Ok(Some(Self {
            version: buf[VERSION_OFFSET],
            format,
            payload_len,
        }))
    }

    /// Total size of the frame this header describes
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub version: u8,
    pub format: SerializationFormat,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(format: SerializationFormat, payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            format,
            payload,
        }
    }

    /// Append the encoded frame to `dst`
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE + self.payload.len());
        dst.put_slice(&MAGIC_BYTES);
        dst.put_u8(self.version);
        dst.put_u8(self.format.format_byte());
        dst.put_u32(self.payload.len() as u32);
        dst.put_slice(&self.payload);
    }
}
