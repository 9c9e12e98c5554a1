//! # Core Protocol Components
//!
//! Frame layout, the message codec, and payload serialization.
//!
//! ## Components
//! - **Packet**: Frame header with magic bytes, version, format and length
//! - **Codec**: Tokio codec for framing messages over byte streams
//! - **Serialization**: Payload encodings selectable per frame
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(1)] [Format(1)] [Length(4)] [Payload(N)]
//! ```
//!
//! ## Safety Limits
//! - Maximum payload size: 16MB by default (prevents memory exhaustion)
//! - Magic bytes are checked as soon as they arrive
//! - Length validation before buffering the payload

pub mod codec;
pub mod packet;
pub mod serialization;
