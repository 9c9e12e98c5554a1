//! Tokio codec turning a byte stream into [`Message`]s and back.
//!
//! Decoding is resumable: bytes that do not yet form a complete frame stay in
//! the buffer and are picked up again once more data arrives. A corrupt frame
//! is an error; the codec never skips bytes looking for the next boundary.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::packet::{FrameHeader, Packet, HEADER_SIZE};
use crate::core::serialization::{MultiFormat, SerializationFormat};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::Message;

#[derive(Debug, Clone)]
pub struct MessageCodec {
    format: SerializationFormat,
    max_payload_size: usize,
    bytes_decoded: u64,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(SerializationFormat::default(), MAX_PAYLOAD_SIZE)
    }
}

impl MessageCodec {
    pub fn new(format: SerializationFormat, max_payload_size: usize) -> Self {
        Self {
            format,
            max_payload_size,
            bytes_decoded: 0,
        }
    }

    /// Format used for outbound payloads
    pub fn format(&self) -> SerializationFormat {
        self.format
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Total frame bytes consumed by successful decodes
    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    /// Encode a single message into a standalone frame
    pub fn encode_message(&self, msg: &Message) -> Result<BytesMut> {
        let mut dst = BytesMut::new();
        self.write_message(msg, &mut dst)?;
        Ok(dst)
    }

    /// Decode every complete frame at the front of `buf`.
    ///
    /// The unconsumed tail (a partial frame, or nothing) is left in `buf` so the
    /// caller can append newly received bytes and call again. On error nothing
    /// is consumed and no message is returned, even if earlier frames were
    /// valid.
    pub fn decode_all(&mut self, buf: &mut BytesMut) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        let mut offset = 0;
        while let Some((msg, frame_len)) = self.peek_frame(&buf[offset..])? {
            messages.push(msg);
            offset += frame_len;
        }

        buf.advance(offset);
        self.bytes_decoded += offset as u64;
        Ok(messages)
    }

    /// Decode the frame at the front of `bytes` without consuming anything.
    ///
    /// Returns the message and the frame length, or `None` while the frame is
    /// incomplete.
    fn peek_frame(&self, bytes: &[u8]) -> Result<Option<(Message, usize)>> {
        let header = match FrameHeader::parse(bytes, self.max_payload_size)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let frame_len = header.frame_len();
        if bytes.len() < frame_len {
            return Ok(None);
        }

        let msg = Message::deserialize_format(&bytes[HEADER_SIZE..frame_len], header.format)?;
        trace!(msg_type = %msg.msg_type(), bytes = frame_len, "Frame decoded");
        Ok(Some((msg, frame_len)))
    }

    fn write_message(&self, msg: &Message, dst: &mut BytesMut) -> Result<()> {
        debug_assert!(!msg.msg_id.is_empty(), "{}", constants::ERR_EMPTY_MSG_ID);

        let payload = msg.serialize_format(self.format)?;
        if payload.len() > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(payload.len()));
        }

        Packet::new(self.format, payload).write_to(dst);
        Ok(())
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        self.write_message(&item, dst)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match self.peek_frame(src)? {
            Some((msg, frame_len)) => {
                src.advance(frame_len);
                self.bytes_decoded += frame_len as u64;
                Ok(Some(msg))
            }
            None => {
                if let Some(header) = FrameHeader::parse(src, self.max_payload_size)? {
                    src.reserve(header.frame_len().saturating_sub(src.len()));
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Message>> {
        match self.decode(buf)? {
            Some(msg) => Ok(Some(msg)),
            None if buf.is_empty() => Ok(None),
            None => {
                warn!(pending = buf.len(), "Stream ended inside a frame");
                Err(ProtocolError::ConnectionClosed)
            }
        }
    }
}
