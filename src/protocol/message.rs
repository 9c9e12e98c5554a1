//! Wire messages exchanged with the topology server.
//!
//! Every message shares the same header (`sender_id`, `receiver_id`,
//! `msg_id`). What it carries is decided by its [`MessageBody`] tag, so a
//! neighbor list can only ever travel inside a `Query` and a topology map only
//! inside a `Topology`.

use crate::core::serialization::MultiFormat;
use crate::utils::id::random_id;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a node in the discovered network
pub type NodeId = String;

/// Node identifier mapped to the ordered neighbor list that node reported
pub type Topology = BTreeMap<NodeId, Vec<NodeId>>;

/// Tag of a message, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Init,
    Query,
    Topology,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Init => "init",
            MessageType::Query => "query",
            MessageType::Topology => "topology",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageBody {
    /// Server assigns the client its identity through `receiver_id`
    Init,
    /// Neighbor query. Outbound requests carry no list; the server's answer
    /// carries the neighbors of the queried node.
    Query { neighbors: Option<Vec<NodeId>> },
    /// Final discovery result
    Topology { topology: Topology },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender_id: NodeId,
    pub receiver_id: NodeId,
    pub msg_id: String,
    pub body: MessageBody,
}

impl MultiFormat for Message {}

impl Message {
    /// Build a message with a freshly generated `msg_id`
    pub fn new(sender_id: impl Into<NodeId>, receiver_id: impl Into<NodeId>, body: MessageBody) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            msg_id: random_id(),
            body,
        }
    }

    /// Handshake message assigning `receiver_id` as the client's identity
    pub fn init(receiver_id: impl Into<NodeId>) -> Self {
        Self::new("", receiver_id, MessageBody::Init)
    }

    /// Request the neighbor list of `receiver_id`
    pub fn query(sender_id: impl Into<NodeId>, receiver_id: impl Into<NodeId>) -> Self {
        Self::new(sender_id, receiver_id, MessageBody::Query { neighbors: None })
    }

    /// Answer to a query, carrying a neighbor list
    pub fn query_response(
        sender_id: impl Into<NodeId>,
        receiver_id: impl Into<NodeId>,
        neighbors: Vec<NodeId>,
    ) -> Self {
        Self::new(
            sender_id,
            receiver_id,
            MessageBody::Query {
                neighbors: Some(neighbors),
            },
        )
    }

    /// Final report of the discovered graph
    pub fn topology(sender_id: impl Into<NodeId>, topology: Topology) -> Self {
        Self::new(sender_id, "", MessageBody::Topology { topology })
    }

    /// Replace the generated `msg_id`
    pub fn with_msg_id(mut self, msg_id: impl Into<String>) -> Self {
        self.msg_id = msg_id.into();
        self
    }

    pub fn msg_type(&self) -> MessageType {
        match self.body {
            MessageBody::Init => MessageType::Init,
            MessageBody::Query { .. } => MessageType::Query,
            MessageBody::Topology { .. } => MessageType::Topology,
        }
    }

    /// Neighbor list, present only on query responses
    pub fn neighbors(&self) -> Option<&[NodeId]> {
        match &self.body {
            MessageBody::Query {
                neighbors: Some(list),
            } => Some(list),
            _ => None,
        }
    }

    /// Topology map, present only on the final report
    pub fn topology_map(&self) -> Option<&Topology> {
        match &self.body {
            MessageBody::Topology { topology } => Some(topology),
            _ => None,
        }
    }
}
