//! Breadth-first topology discovery over a single framed connection.
//!
//! The protocol is split in two layers:
//!
//! - [`Traversal`] holds the BFS state (visited set, frontier, topology map)
//!   and turns query responses into the next queries. It performs no I/O.
//! - [`DiscoverySession`] owns the connection and walks the state machine
//!   `AwaitingHandshake -> Querying -> Finalizing -> Done`, ending in
//!   `Aborted` or `Failed` instead when the session cannot complete.
//!
//! Each session owns its own state; nothing is shared between connections.

use crate::core::codec::MessageCodec;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::{Message, MessageType, NodeId, Topology};
use crate::transport::retry::RetryIo;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::{with_timeout_error, RESPONSE_TIMEOUT};

use futures::{SinkExt, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, FramedParts};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    AwaitingHandshake,
    Querying,
    Finalizing,
    Done,
    Aborted,
    Failed,
}

impl DiscoveryState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DiscoveryState::Done | DiscoveryState::Aborted | DiscoveryState::Failed
        )
    }
}

/// A query that has been sent and awaits its neighbor list
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingQuery {
    node: NodeId,
    msg_id: String,
}

/// BFS state of one discovery session.
///
/// Responses are matched to the pending query whose `msg_id` they carry; a
/// response with an unknown `msg_id` answers the oldest pending query, which
/// relies on the server answering in the order queries were sent.
#[derive(Debug, Default)]
pub struct Traversal {
    self_id: Option<NodeId>,
    visited: HashSet<NodeId>,
    frontier: VecDeque<PendingQuery>,
    topology: Topology,
}

impl Traversal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt `self_id` and return the self-seed query that starts discovery
    pub fn start(&mut self, self_id: impl Into<NodeId>) -> Message {
        let self_id = self_id.into();
        self.self_id = Some(self_id.clone());
        self.enqueue(self_id)
    }

    pub fn self_id(&self) -> Option<&str> {
        self.self_id.as_deref()
    }

    pub fn visited(&self) -> &HashSet<NodeId> {
        &self.visited
    }

    /// Nodes whose query is still unanswered, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.frontier.iter().map(|p| p.node.as_str())
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Started and no query left unanswered
    pub fn is_complete(&self) -> bool {
        self.self_id.is_some() && self.frontier.is_empty()
    }

    /// Fold a response into the topology.
    ///
    /// Returns `None` if the message carries no neighbor list or nothing is
    /// pending; otherwise the queries for newly seen neighbors, in the order
    /// the neighbors were listed.
    pub fn apply_response(&mut self, msg: &Message) -> Option<Vec<Message>> {
        let neighbors = msg.neighbors()?;

        let correlated = self.frontier.iter().position(|p| p.msg_id == msg.msg_id);
        let answered = self.frontier.remove(correlated.unwrap_or(0))?;

        debug!(
            node = %answered.node,
            neighbors = neighbors.len(),
            correlated = correlated.is_some(),
            "Neighbor list received"
        );

        let mut queries = Vec::new();
        for neighbor in neighbors {
            if !self.visited.contains(neighbor) {
                queries.push(self.enqueue(neighbor.clone()));
            }
        }

        self.topology.insert(answered.node, neighbors.to_vec());
        Some(queries)
    }

    /// Final topology report, addressed to nobody
    pub fn report(&self) -> Message {
        Message::topology(self.self_id.clone().unwrap_or_default(), self.topology.clone())
    }

    fn enqueue(&mut self, node: NodeId) -> Message {
        let sender = self.self_id.clone().unwrap_or_default();
        let query = Message::query(sender, node.clone());
        self.visited.insert(node.clone());
        self.frontier.push_back(PendingQuery {
            node,
            msg_id: query.msg_id.clone(),
        });
        query
    }
}

/// Drives one discovery exchange over an established connection
pub struct DiscoverySession<T> {
    framed: Framed<RetryIo<T>, MessageCodec>,
    state: DiscoveryState,
    traversal: Traversal,
    response_timeout: Duration,
    shutdown: Option<mpsc::Receiver<()>>,
    metrics: Arc<Metrics>,
}

impl<T> DiscoverySession<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(framed: Framed<T, MessageCodec>) -> Self {
        let metrics = Arc::new(Metrics::new());
        let framed = map_io(framed, |io| {
            let mut io = RetryIo::new(io);
            io.set_metrics(Arc::clone(&metrics));
            io
        });

        Self {
            framed,
            state: DiscoveryState::AwaitingHandshake,
            traversal: Traversal::new(),
            response_timeout: RESPONSE_TIMEOUT,
            shutdown: None,
            metrics,
        }
    }

    pub fn from_stream(stream: T, codec: MessageCodec) -> Self {
        Self::new(Framed::new(stream, codec))
    }

    /// Bound every read and write of the session
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Record into a shared metrics collector
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.framed.get_mut().set_metrics(Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    pub fn self_id(&self) -> Option<&str> {
        self.traversal.self_id()
    }

    /// Topology gathered so far; complete once the state is `Done`
    pub fn topology(&self) -> &Topology {
        self.traversal.topology()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Hand the connection back so the caller can close it
    pub fn into_inner(self) -> Framed<T, MessageCodec> {
        map_io(self.framed, RetryIo::into_inner)
    }

    /// Run discovery to completion.
    ///
    /// Any failure leaves the session in `Failed` (or `Aborted`) and no
    /// topology is sent.
    #[instrument(skip(self), level = "info")]
    pub async fn run(&mut self) -> Result<()> {
        if self.state != DiscoveryState::AwaitingHandshake {
            return Err(ProtocolError::SessionReused);
        }

        let result = self.drive().await;
        match &result {
            Ok(()) => {
                self.state = DiscoveryState::Done;
                self.metrics.session_completed();
                info!(
                    self_id = self.self_id().unwrap_or_default(),
                    nodes = self.topology().len(),
                    "Topology delivered"
                );
            }
            Err(ProtocolError::Aborted) => {
                self.state = DiscoveryState::Aborted;
                self.metrics.session_failed();
                warn!("Discovery aborted by shutdown signal");
            }
            Err(e) => {
                self.state = DiscoveryState::Failed;
                self.metrics.session_failed();
                error!(error = %e, "Discovery failed");
            }
        }
        debug_assert!(self.state.is_terminal());
        result
    }

    /// Run discovery, aborting as soon as `shutdown_rx` receives a value.
    ///
    /// Dropping every sender without sending leaves the session running.
    pub async fn run_with_shutdown(&mut self, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        self.shutdown = Some(shutdown_rx);
        self.run().await
    }

    async fn drive(&mut self) -> Result<()> {
        let self_id = self.await_handshake().await?;
        info!(self_id = %self_id, "Identity assigned");

        self.state = DiscoveryState::Querying;
        let seed = self.traversal.start(self_id);
        self.send_query(seed).await?;

        while !self.traversal.is_complete() {
            let msg = self.next_message().await?;

            let Some(queries) = self.traversal.apply_response(&msg) else {
                debug!(msg_type = %msg.msg_type(), "Ignoring message without neighbor list");
                continue;
            };
            self.metrics.response_processed();

            for query in queries {
                self.send_query(query).await?;
            }
        }

        self.state = DiscoveryState::Finalizing;
        info!(nodes = self.traversal.topology().len(), "Traversal complete");
        let report = self.traversal.report();
        self.send(report).await
    }

    async fn await_handshake(&mut self) -> Result<NodeId> {
        loop {
            let msg = match self.next_message().await {
                Ok(msg) => msg,
                Err(e @ (ProtocolError::Timeout | ProtocolError::Aborted)) => return Err(e),
                Err(ProtocolError::ConnectionClosed) => {
                    return Err(ProtocolError::HandshakeFailed(
                        constants::ERR_CLOSED_BEFORE_INIT.to_string(),
                    ))
                }
                Err(e) => return Err(ProtocolError::HandshakeFailed(e.to_string())),
            };

            if msg.msg_type() == MessageType::Init {
                return Ok(msg.receiver_id);
            }
            debug!(msg_type = %msg.msg_type(), "Ignoring message before init");
        }
    }

    async fn send_query(&mut self, query: Message) -> Result<()> {
        debug!(from = %query.sender_id, to = %query.receiver_id, "Sending query");
        self.send(query).await?;
        self.metrics.query_sent();
        Ok(())
    }

    async fn send(&mut self, msg: Message) -> Result<()> {
        let framed = &mut self.framed;
        let write = async {
            framed.feed(msg).await?;
            let written = framed.write_buffer().len();
            framed.flush().await?;
            Ok::<_, ProtocolError>(written)
        };

        let written = tokio::select! {
            result = with_timeout_error(write, self.response_timeout) => result?,
            _ = wait_for_shutdown(&mut self.shutdown) => return Err(ProtocolError::Aborted),
        };

        self.metrics.message_sent(written as u64);
        Ok(())
    }

    /// Next decoded message. Transient read failures were already retried
    /// underneath the codec, so every error here is final.
    async fn next_message(&mut self) -> Result<Message> {
        let decoded_before = self.framed.codec().bytes_decoded();
        let read = with_timeout_error(next_frame(&mut self.framed), self.response_timeout);

        let outcome = tokio::select! {
            result = read => result,
            _ = wait_for_shutdown(&mut self.shutdown) => Err(ProtocolError::Aborted),
        };

        match outcome {
            Ok(msg) => {
                let bytes = self.framed.codec().bytes_decoded() - decoded_before;
                self.metrics.message_received(bytes);
                Ok(msg)
            }
            Err(e) => {
                if e.is_framing_error() {
                    self.metrics.framing_error();
                }
                Err(e)
            }
        }
    }
}

async fn next_frame<T>(framed: &mut Framed<T, MessageCodec>) -> Result<Message>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed.next().await.ok_or(ProtocolError::ConnectionClosed)?
}

/// Swap the stream under `framed`, keeping both buffers and the codec
fn map_io<A, B>(framed: Framed<A, MessageCodec>, f: impl FnOnce(A) -> B) -> Framed<B, MessageCodec> {
    let old = framed.into_parts();
    let mut parts = FramedParts::new::<Message>(f(old.io), old.codec);
    parts.read_buf = old.read_buf;
    parts.write_buf = old.write_buf;
    Framed::from_parts(parts)
}

/// Resolves once a shutdown value arrives. With no receiver, or once every
/// sender is gone, no signal can come and this never resolves.
async fn wait_for_shutdown(shutdown: &mut Option<mpsc::Receiver<()>>) {
    if let Some(rx) = shutdown {
        if rx.recv().await.is_some() {
            return;
        }
        *shutdown = None;
    }
    std::future::pending::<()>().await
}
