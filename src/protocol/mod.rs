//! # Discovery Protocol
//!
//! Message model and the breadth-first discovery state machine.
//!
//! ## Flow
//! 1. Server sends `Init`, assigning the client's node id via `receiver_id`
//! 2. Client queries itself, then every newly seen neighbor
//! 3. Once every query is answered the client sends one `Topology` report

pub mod discovery;
pub mod message;
