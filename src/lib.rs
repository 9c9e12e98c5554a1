//! # Topology Discovery
//!
//! Client for discovering the neighbor graph of a distributed network.
//!
//! The client connects to a topology server, receives its own node identity
//! in an `Init` message, queries the neighbor list of every reachable node in
//! breadth-first order, and reports the assembled map back in a single
//! `Topology` message.
//!
//! ## Layout
//! - [`core`]: frame layout, message codec, payload serialization
//! - [`protocol`]: message model and the discovery state machine
//! - [`transport`]: TCP connection setup
//! - [`service`]: configuration-driven client
//! - [`config`], [`error`], [`utils`]: ambient support
//!
//! ## Example
//! ```rust,no_run
//! use topology_discovery::config::DiscoveryConfig;
//! use topology_discovery::service::DiscoveryClient;
//!
//! # async fn demo() -> topology_discovery::error::Result<()> {
//! let config = DiscoveryConfig::from_env()?;
//! let client = DiscoveryClient::new(config)?;
//! client.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::codec::MessageCodec;
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::discovery::{DiscoverySession, DiscoveryState, Traversal};
pub use crate::protocol::message::{Message, MessageBody, MessageType, NodeId, Topology};
