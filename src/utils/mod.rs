//! # Utility Modules
//!
//! Supporting utilities shared by the codec, the discovery engine and the client.
//!
//! ## Components
//! - **Id**: Random message identifiers
//! - **Logging**: Tracing subscriber configuration
//! - **Metrics**: Thread-safe session counters
//! - **Timeout**: Async deadline wrappers

pub mod id;
pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
