//! # Services
//!
//! Orchestration on top of the protocol: configuration in, one discovery
//! session out.

pub mod client;

pub use client::DiscoveryClient;
