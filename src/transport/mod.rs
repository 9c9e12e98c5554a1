//! # Transport Layer
//!
//! Establishes the stream the discovery session runs over.
//!
//! The session itself only needs `AsyncRead + AsyncWrite`, so tests drive it
//! over in-memory pipes while production uses TCP. Whatever the stream, the
//! session wraps it in [`RetryIo`] so transient I/O failures never reach the
//! codec.

pub mod retry;
pub mod tcp;

pub use retry::{RetryIo, MAX_TRANSIENT_RETRIES};
pub use tcp::{codec_for, connect};
