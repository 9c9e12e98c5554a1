//! End-to-end discovery sessions against scripted in-memory servers.
//!
//! Each test wires a `DiscoverySession` to one end of a `tokio::io::duplex`
//! pipe and plays the topology server on the other end.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use futures::{SinkExt, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use topology_discovery::core::serialization::SerializationFormat;
use topology_discovery::transport::MAX_TRANSIENT_RETRIES;
use topology_discovery::{
    DiscoverySession, DiscoveryState, Message, MessageBody, MessageCodec, MessageType,
    ProtocolError, Topology,
};

const PIPE_CAPACITY: usize = 64 * 1024;

type Graph = HashMap<String, Vec<String>>;

fn graph(edges: &[(&str, &[&str])]) -> Graph {
    edges
        .iter()
        .map(|(n, ns)| (n.to_string(), ns.iter().map(|s| s.to_string()).collect()))
        .collect()
}

fn topology(edges: &[(&str, &[&str])]) -> Topology {
    graph(edges).into_iter().collect::<BTreeMap<_, _>>()
}

fn session_pair() -> (DiscoverySession<DuplexStream>, DuplexStream) {
    let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
    let session = DiscoverySession::from_stream(client, MessageCodec::default())
        .with_response_timeout(Duration::from_secs(5));
    (session, server)
}

/// Answers queries in arrival order until the topology report shows up.
/// Returns everything the client sent.
async fn fifo_server(stream: DuplexStream, self_id: &str, graph: Graph, codec: MessageCodec) -> Vec<Message> {
    let mut framed = Framed::new(stream, codec);
    framed.send(Message::init(self_id)).await.unwrap();

    let mut received = Vec::new();
    while let Some(frame) = framed.next().await {
        let msg = frame.unwrap();
        received.push(msg.clone());
        match msg.body {
            MessageBody::Query { .. } => {
                let neighbors = graph.get(&msg.receiver_id).cloned().unwrap_or_default();
                framed
                    .send(Message::query_response("server", self_id, neighbors))
                    .await
                    .unwrap();
            }
            MessageBody::Topology { .. } => break,
            MessageBody::Init => panic!("client never sends init"),
        }
    }
    received
}

fn query_targets(sent: &[Message]) -> Vec<&str> {
    sent.iter()
        .filter(|m| m.msg_type() == MessageType::Query)
        .map(|m| m.receiver_id.as_str())
        .collect()
}

#[tokio::test]
async fn test_linear_chain() {
    let edges: &[(&str, &[&str])] = &[("A", &["B"]), ("B", &["C"]), ("C", &[])];
    let (mut session, server) = session_pair();
    let server = tokio::spawn(fifo_server(server, "A", graph(edges), MessageCodec::default()));

    session.run().await.expect("discovery succeeds");
    let sent = server.await.unwrap();

    assert_eq!(session.state(), DiscoveryState::Done);
    assert_eq!(session.self_id(), Some("A"));
    assert_eq!(query_targets(&sent), vec!["A", "B", "C"]);
    assert!(sent[..3].iter().all(|m| m.sender_id == "A"));

    let report = sent.last().unwrap();
    assert_eq!(report.msg_type(), MessageType::Topology);
    assert_eq!(report.sender_id, "A");
    assert_eq!(report.receiver_id, "");
    assert_eq!(report.topology_map(), Some(&topology(edges)));
    assert_eq!(session.topology(), &topology(edges));

    let ids: HashSet<&str> = sent.iter().map(|m| m.msg_id.as_str()).collect();
    assert_eq!(ids.len(), sent.len(), "msg_id unique per message");
}

#[tokio::test]
async fn test_cycle() {
    let edges: &[(&str, &[&str])] = &[("A", &["B"]), ("B", &["A"])];
    let (mut session, server) = session_pair();
    let server = tokio::spawn(fifo_server(server, "A", graph(edges), MessageCodec::default()));

    session.run().await.unwrap();
    let sent = server.await.unwrap();

    assert_eq!(query_targets(&sent), vec!["A", "B"]);
    assert_eq!(sent.last().unwrap().topology_map(), Some(&topology(edges)));
}

#[tokio::test]
async fn test_only_reachable_nodes_are_reported() {
    let edges: &[(&str, &[&str])] = &[
        ("A", &["B", "C"]),
        ("B", &["C", "D"]),
        ("C", &["A"]),
        ("D", &["B"]),
        ("Z", &["A"]),
    ];
    let (mut session, server) = session_pair();
    let server = tokio::spawn(fifo_server(server, "A", graph(edges), MessageCodec::default()));

    session.run().await.unwrap();
    let sent = server.await.unwrap();

    assert_eq!(query_targets(&sent), vec!["A", "B", "C", "D"]);
    let reported = sent.last().unwrap().topology_map().unwrap();
    assert!(!reported.contains_key("Z"));
    assert_eq!(reported["B"], vec!["C", "D"]);
}

#[tokio::test]
async fn test_json_speaking_server() {
    let edges: &[(&str, &[&str])] = &[("node-1", &["node 2"]), ("node 2", &[])];
    let (mut session, server) = session_pair();
    let codec = MessageCodec::new(SerializationFormat::Json, 1024 * 1024);
    let server = tokio::spawn(fifo_server(server, "node-1", graph(edges), codec));

    session.run().await.unwrap();
    let sent = server.await.unwrap();
    assert_eq!(sent.last().unwrap().topology_map(), Some(&topology(edges)));
}

#[tokio::test]
async fn test_traffic_before_init_is_ignored() {
    let (mut session, stream) = session_pair();
    let server = tokio::spawn(async move {
        let mut framed = Framed::new(stream, MessageCodec::default());
        framed
            .send(Message::query_response("server", "X", vec!["Y".into()]))
            .await
            .unwrap();
        framed.send(Message::topology("server", Topology::new())).await.unwrap();
        framed.send(Message::init("A")).await.unwrap();

        let seed = framed.next().await.unwrap().unwrap();
        framed
            .send(Message::query_response("server", "A", vec![]))
            .await
            .unwrap();
        let report = framed.next().await.unwrap().unwrap();
        (seed, report)
    });

    session.run().await.unwrap();
    let (seed, report) = server.await.unwrap();

    assert_eq!(seed.sender_id, "A");
    assert_eq!(seed.receiver_id, "A");
    assert_eq!(report.topology_map(), Some(&topology(&[("A", &[])])));
}

#[tokio::test]
async fn test_closed_before_init_fails_handshake() {
    let (mut session, server) = session_pair();
    drop(server);

    let err = session.run().await.unwrap_err();
    assert!(matches!(err, ProtocolError::HandshakeFailed(_)), "got {err:?}");
    assert_eq!(session.state(), DiscoveryState::Failed);
    assert_eq!(session.self_id(), None);
}

#[tokio::test]
async fn test_garbage_before_init_fails_handshake() {
    let (mut session, mut server) = session_pair();
    server.write_all(b"HTTP/1.1 400 Bad Request\r\n").await.unwrap();

    let err = session.run().await.unwrap_err();
    match err {
        ProtocolError::HandshakeFailed(reason) => assert!(reason.contains("header")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.metrics().snapshot().framing_errors, 1);
}

#[tokio::test]
async fn test_close_mid_query_is_fatal_and_sends_no_topology() {
    let (mut session, stream) = session_pair();
    let server = tokio::spawn(async move {
        let mut framed = Framed::new(stream, MessageCodec::default());
        framed.send(Message::init("A")).await.unwrap();
        let seed = framed.next().await.unwrap().unwrap();
        framed
            .send(Message::query_response("server", "A", vec!["B".into()]))
            .await
            .unwrap();
        let query_b = framed.next().await.unwrap().unwrap();
        (seed, query_b)
    });

    let err = session.run().await.unwrap_err();
    let (seed, query_b) = server.await.unwrap();

    assert!(matches!(err, ProtocolError::ConnectionClosed), "got {err:?}");
    assert_eq!(session.state(), DiscoveryState::Failed);
    assert_eq!(seed.receiver_id, "A");
    assert_eq!(query_b.receiver_id, "B");
    assert_eq!(session.metrics().snapshot().messages_sent, 2);
}

#[tokio::test]
async fn test_corrupt_frame_mid_query() {
    let (mut session, stream) = session_pair();
    let server = tokio::spawn(async move {
        let mut framed = Framed::new(stream, MessageCodec::default());
        framed.send(Message::init("A")).await.unwrap();
        let _seed = framed.next().await.unwrap().unwrap();
        let mut raw = framed.into_inner();
        raw.write_all(&[0xde, 0xad, 0xbe, 0xef]).await.unwrap();
        std::future::pending::<()>().await;
    });

    let err = session.run().await.unwrap_err();
    server.abort();

    assert!(err.is_framing_error(), "got {err:?}");
    assert_eq!(session.state(), DiscoveryState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_times_out() {
    let (client, stream) = tokio::io::duplex(PIPE_CAPACITY);
    let mut session = DiscoverySession::from_stream(client, MessageCodec::default())
        .with_response_timeout(Duration::from_secs(2));

    let server = tokio::spawn(async move {
        let mut framed = Framed::new(stream, MessageCodec::default());
        framed.send(Message::init("A")).await.unwrap();
        let _seed = framed.next().await;
        std::future::pending::<()>().await;
    });

    let err = session.run().await.unwrap_err();
    server.abort();

    assert!(matches!(err, ProtocolError::Timeout), "got {err:?}");
    assert_eq!(session.state(), DiscoveryState::Failed);
    assert_eq!(session.self_id(), Some("A"));
}

#[tokio::test]
async fn test_shutdown_signal_aborts() {
    let (mut session, stream) = session_pair();
    let server = tokio::spawn(async move {
        let mut framed = Framed::new(stream, MessageCodec::default());
        framed.send(Message::init("A")).await.unwrap();
        let _seed = framed.next().await;
        std::future::pending::<()>().await;
    });

    let (tx, rx) = mpsc::channel::<()>(1);
    tx.send(()).await.unwrap();

    let err = session.run_with_shutdown(rx).await.unwrap_err();
    server.abort();

    assert!(matches!(err, ProtocolError::Aborted), "got {err:?}");
    assert_eq!(session.state(), DiscoveryState::Aborted);
    assert!(session.topology().is_empty());
}

#[tokio::test]
async fn test_dropped_shutdown_sender_does_not_abort() {
    let edges: &[(&str, &[&str])] = &[("A", &["B"]), ("B", &[])];
    let (mut session, server) = session_pair();
    let server = tokio::spawn(fifo_server(server, "A", graph(edges), MessageCodec::default()));

    let (tx, rx) = mpsc::channel::<()>(1);
    drop(tx);

    session.run_with_shutdown(rx).await.unwrap();
    assert_eq!(server.await.unwrap().last().unwrap().topology_map(), Some(&topology(edges)));
}

#[tokio::test]
async fn test_reordered_responses_with_echoed_ids() {
    let (mut session, stream) = session_pair();
    let server = tokio::spawn(async move {
        let mut framed = Framed::new(stream, MessageCodec::default());
        framed.send(Message::init("A")).await.unwrap();

        let seed = framed.next().await.unwrap().unwrap();
        framed
            .send(
                Message::query_response("server", "A", vec!["B".into(), "C".into()])
                    .with_msg_id(seed.msg_id),
            )
            .await
            .unwrap();

        let first = framed.next().await.unwrap().unwrap();
        let second = framed.next().await.unwrap().unwrap();
        let answers: HashMap<&str, Vec<String>> =
            HashMap::from([("B", vec!["A".to_string()]), ("C", vec![])]);

        // Answer in reverse order, echoing each query's msg_id
        for query in [second, first] {
            let neighbors = answers[query.receiver_id.as_str()].clone();
            framed
                .send(Message::query_response("server", "A", neighbors).with_msg_id(query.msg_id))
                .await
                .unwrap();
        }

        framed.next().await.unwrap().unwrap()
    });

    session.run().await.unwrap();
    let report = server.await.unwrap();

    let expected = topology(&[("A", &["B", "C"]), ("B", &["A"]), ("C", &[])]);
    assert_eq!(report.topology_map(), Some(&expected));
}

#[tokio::test]
async fn test_session_cannot_run_twice() {
    let (mut session, server) = session_pair();
    let server = tokio::spawn(fifo_server(server, "A", graph(&[("A", &[])]), MessageCodec::default()));

    session.run().await.unwrap();
    server.await.unwrap();

    assert!(matches!(session.run().await, Err(ProtocolError::SessionReused)));
    assert_eq!(session.state(), DiscoveryState::Done);
    assert!(session.state().is_terminal());
}

#[test]
fn test_terminal_states() {
    assert!(!DiscoveryState::AwaitingHandshake.is_terminal());
    assert!(!DiscoveryState::Querying.is_terminal());
    assert!(!DiscoveryState::Finalizing.is_terminal());
    assert!(DiscoveryState::Done.is_terminal());
    assert!(DiscoveryState::Aborted.is_terminal());
    assert!(DiscoveryState::Failed.is_terminal());
}

/// Client end of a pipe whose reads fail with `kind` `failures` times once
/// the first bytes have been delivered.
struct FlakyStream {
    inner: DuplexStream,
    delivered: usize,
    failures: usize,
    kind: io::ErrorKind,
}

impl FlakyStream {
    fn new(inner: DuplexStream, failures: usize, kind: io::ErrorKind) -> Self {
        Self {
            inner,
            delivered: 0,
            failures,
            kind,
        }
    }
}

impl AsyncRead for FlakyStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.delivered > 0 && self.failures > 0 {
            self.failures -= 1;
            return Poll::Ready(Err(io::Error::from(self.kind)));
        }
        let before = buf.filled().len();
        let polled = Pin::new(&mut self.inner).poll_read(cx, buf);
        self.delivered += buf.filled().len() - before;
        polled
    }
}

impl AsyncWrite for FlakyStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

fn flaky_pair(failures: usize, kind: io::ErrorKind) -> (DiscoverySession<FlakyStream>, DuplexStream) {
    let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
    let session = DiscoverySession::from_stream(FlakyStream::new(client, failures, kind), MessageCodec::default())
        .with_response_timeout(Duration::from_secs(5));
    (session, server)
}

#[tokio::test]
async fn test_interrupted_read_is_retried_transparently() {
    let edges: &[(&str, &[&str])] = &[("A", &["B"]), ("B", &[])];
    let (mut session, server) = flaky_pair(1, io::ErrorKind::Interrupted);
    let server = tokio::spawn(fifo_server(server, "A", graph(edges), MessageCodec::default()));

    session.run().await.expect("one interrupted read must not end the session");
    let sent = server.await.unwrap();

    assert_eq!(session.state(), DiscoveryState::Done);
    assert_eq!(sent.last().unwrap().topology_map(), Some(&topology(edges)));
    assert_eq!(session.metrics().snapshot().transient_retries, 1);
}

#[tokio::test]
async fn test_would_block_read_is_retried_transparently() {
    let edges: &[(&str, &[&str])] = &[("A", &[])];
    let (mut session, server) = flaky_pair(2, io::ErrorKind::WouldBlock);
    let server = tokio::spawn(fifo_server(server, "A", graph(edges), MessageCodec::default()));

    session.run().await.unwrap();
    server.await.unwrap();
    assert_eq!(session.metrics().snapshot().transient_retries, 2);
}

#[tokio::test]
async fn test_persistent_interruption_surfaces_io_error() {
    let (mut session, stream) = flaky_pair(usize::MAX, io::ErrorKind::Interrupted);
    let server = tokio::spawn(async move {
        let mut framed = Framed::new(stream, MessageCodec::default());
        framed.send(Message::init("A")).await.unwrap();
        let _seed = framed.next().await;
        std::future::pending::<()>().await;
    });

    let err = session.run().await.unwrap_err();
    server.abort();

    match err {
        ProtocolError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::Interrupted),
        other => panic!("expected the original I/O error, got {other:?}"),
    }
    assert!(session.state().is_terminal());
    assert_eq!(session.state(), DiscoveryState::Failed);
    assert_eq!(
        session.metrics().snapshot().transient_retries,
        u64::from(MAX_TRANSIENT_RETRIES)
    );
}

#[tokio::test]
async fn test_metrics_follow_the_exchange() {
    let edges: &[(&str, &[&str])] = &[("A", &["B", "C"]), ("B", &[]), ("C", &[])];
    let (mut session, server) = session_pair();
    let server = tokio::spawn(fifo_server(server, "A", graph(edges), MessageCodec::default()));

    session.run().await.unwrap();
    server.await.unwrap();

    let snap = session.metrics().snapshot();
    assert_eq!(snap.queries_sent, 3);
    assert_eq!(snap.responses_processed, 3);
    assert_eq!(snap.messages_sent, 4);
    assert_eq!(snap.messages_received, 4);
    assert!(snap.bytes_sent > 0);
    assert!(snap.bytes_received > 0);
    assert_eq!(snap.sessions_completed, 1);
    assert_eq!(snap.framing_errors, 0);
}
