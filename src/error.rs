//! # Error Types
//!
//! Error handling for the topology discovery client.
//!
//! This module defines every failure a discovery session can surface, from
//! low-level I/O and framing errors up to handshake and cancellation outcomes.
//!
//! ## Error Categories
//! - **Framing Errors**: Bytes on the wire that cannot be interpreted as a frame
//! - **Connection Errors**: Peer shutdown, read deadlines, I/O failures
//! - **Session Errors**: Handshake failure, external cancellation
//! - **Configuration Errors**: Invalid or unreadable configuration
//!
//! Errors are classified as *transient* (safe to retry the same operation) or
//! *fatal* (the session must stop and report). Only interrupted or
//! would-block I/O is transient, and it is retried below the codec by
//! [`RetryIo`](crate::transport::retry::RetryIo). A closed connection is
//! never retried.
//!
//! ## Example Usage
//! ```rust
//! use topology_discovery::error::{ProtocolError, Result};
//! use tracing::error;
//!
//! fn check(frame_ok: bool) -> Result<()> {
//!     if !frame_ok {
//!         return Err(ProtocolError::InvalidHeader);
//!     }
//!     Ok(())
//! }
//!
//! if let Err(e) = check(false) {
//!     assert!(e.is_framing_error());
//!     error!(error = %e, "Session failed");
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Handshake errors
    pub const ERR_CLOSED_BEFORE_INIT: &str = "Connection closed before an init message arrived";

    /// Encoding errors
    pub const ERR_EMPTY_MSG_ID: &str = "Outbound message has an empty msg_id";
}

// ProtocolError is the primary error type for all discovery operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Framing error: {0}")]
    FramingError(String),

    #[error("Invalid protocol header")]
    InvalidHeader,

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported serialization format: {0:#04x}")]
    UnsupportedFormat(u8),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Session aborted")]
    Aborted,

    #[error("Discovery session already ran")]
    SessionReused,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Whether the error means the byte stream could not be interpreted as frames
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::FramingError(_)
                | ProtocolError::InvalidHeader
                | ProtocolError::UnsupportedVersion(_)
                | ProtocolError::UnsupportedFormat(_)
                | ProtocolError::OversizedPacket(_)
        )
    }

    /// Whether the failed operation may simply be attempted again.
    ///
    /// Only I/O that was interrupted or would have blocked qualifies.
    pub fn is_transient(&self) -> bool {
        match self {
            ProtocolError::Io(e) => is_transient_kind(e.kind()),
            _ => false,
        }
    }

    /// Inverse of [`is_transient`](Self::is_transient)
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

/// I/O failure kinds that say nothing about the health of the connection
pub fn is_transient_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
