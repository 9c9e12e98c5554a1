//! # Serialization Formats
//!
//! Payload encodings available inside a frame. The frame header carries a
//! format byte, so the decoder always knows how to read a payload regardless
//! of which format the local encoder is configured with.
//!
//! ## Formats
//! - **Bincode**: binary, compact, fastest (default)
//! - **JSON**: human-readable, handy when inspecting traffic
//! - **MessagePack**: compact binary, self-describing
//!
//! ## Usage
//! ```rust
//! use topology_discovery::core::serialization::{MultiFormat, SerializationFormat};
//! use topology_discovery::protocol::message::Message;
//!
//! let msg = Message::init("A");
//! let bytes = msg.serialize_format(SerializationFormat::Json).unwrap();
//! let back = Message::deserialize_format(&bytes, SerializationFormat::Json).unwrap();
//! assert_eq!(msg, back);
//! ```

use crate::error::{ProtocolError, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Binary compact format (default, fastest)
    #[default]
    Bincode,
    /// Human-readable JSON format (debugging, interop)
    Json,
    /// Compact binary format (MessagePack, efficient)
    #[serde(alias = "msgpack")]
    MessagePack,
}

impl SerializationFormat {
    /// Get the format identifier byte for wire protocol
    pub fn format_byte(self) -> u8 {
        match self {
            SerializationFormat::Bincode => 0x01,
            SerializationFormat::Json => 0x02,
            SerializationFormat::MessagePack => 0x03,
        }
    }

    /// Detect format from identifier byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(SerializationFormat::Bincode),
            0x02 => Some(SerializationFormat::Json),
            0x03 => Some(SerializationFormat::MessagePack),
            _ => None,
        }
    }

    /// Parse a format name as used in configuration and environment variables
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bincode" => Some(SerializationFormat::Bincode),
            "json" => Some(SerializationFormat::Json),
            "messagepack" | "msgpack" => Some(SerializationFormat::MessagePack),
            _ => None,
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            SerializationFormat::Bincode => "Bincode",
            SerializationFormat::Json => "JSON",
            SerializationFormat::MessagePack => "MessagePack",
        }
    }
}

/// Bincode settings for both directions: fixed-width integers, and a payload
/// must be consumed exactly
fn bincode_options() -> impl bincode::Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Trait for types that support multiple serialization formats
pub trait MultiFormat: Serialize + for<'de> Deserialize<'de> + Sized {
    /// Serialize to bytes using the specified format
    fn serialize_format(&self, format: SerializationFormat) -> Result<Vec<u8>> {
        match format {
            SerializationFormat::Bincode => bincode_options()
                .serialize(self)
                .map_err(|e| ProtocolError::SerializeError(e.to_string())),
            SerializationFormat::Json => {
                serde_json::to_vec(self).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
            SerializationFormat::MessagePack => {
                rmp_serde::to_vec(self).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
        }
    }

    /// Deserialize from bytes using the specified format.
    ///
    /// A payload that does not decode, or decodes without using every byte,
    /// is a framing failure: the frame boundary was valid but its contents
    /// cannot be interpreted.
    fn deserialize_format(data: &[u8], format: SerializationFormat) -> Result<Self> {
        match format {
            SerializationFormat::Bincode => bincode_options()
                .deserialize(data)
                .map_err(|e| ProtocolError::FramingError(e.to_string())),
            SerializationFormat::Json => serde_json::from_slice(data)
                .map_err(|e| ProtocolError::FramingError(e.to_string())),
            SerializationFormat::MessagePack => from_msgpack_exact(data),
        }
    }
}

fn from_msgpack_exact<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    let mut cursor = Cursor::new(data);
    let value = {
        let mut de = rmp_serde::Deserializer::new(&mut cursor);
        T::deserialize(&mut de).map_err(|e| ProtocolError::FramingError(e.to_string()))?
    };

    let consumed = cursor.position() as usize;
    if consumed != data.len() {
        return Err(ProtocolError::FramingError(format!(
            "{} trailing bytes after MessagePack value",
            data.len() - consumed
        )));
    }
    Ok(value)
}
