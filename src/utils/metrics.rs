//! Observability and Metrics
//!
//! Counters describing what a discovery session did on the wire.
//!
//! Uses atomic counters so a metrics handle can be shared with whoever
//! reports on the session while it runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Metrics {
    /// Total messages sent
    pub messages_sent: AtomicU64,
    /// Total messages received
    pub messages_received: AtomicU64,
    /// Total frame bytes sent
    pub bytes_sent: AtomicU64,
    /// Total frame bytes received
    pub bytes_received: AtomicU64,
    /// Neighbor queries issued, self-seed included
    pub queries_sent: AtomicU64,
    /// Query responses folded into the topology
    pub responses_processed: AtomicU64,
    /// Inbound frames that could not be interpreted
    pub framing_errors: AtomicU64,
    /// Reads retried after a transient failure
    pub transient_retries: AtomicU64,
    /// Sessions that delivered a topology
    pub sessions_completed: AtomicU64,
    /// Sessions that ended with an error
    pub sessions_failed: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            queries_sent: AtomicU64::new(0),
            responses_processed: AtomicU64::new(0),
            framing_errors: AtomicU64::new(0),
            transient_retries: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
            sessions_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a message sent
    pub fn message_sent(&self, byte_count: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a message received
    pub fn message_received(&self, byte_count: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn query_sent(&self) {
        self.queries_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_processed(&self) {
        self.responses_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transient_retry(&self) {
        self.transient_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            queries_sent: self.queries_sent.load(Ordering::Relaxed),
            responses_processed: self.responses_processed.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            transient_retries: self.transient_retries.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            messages_sent = snapshot.messages_sent,
            messages_received = snapshot.messages_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            queries_sent = snapshot.queries_sent,
            responses_processed = snapshot.responses_processed,
            framing_errors = snapshot.framing_errors,
            transient_retries = snapshot.transient_retries,
            sessions_completed = snapshot.sessions_completed,
            sessions_failed = snapshot.sessions_failed,
            uptime_seconds = snapshot.uptime_seconds,
            "Discovery metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub queries_sent: u64,
    pub responses_processed: u64,
    pub framing_errors: u64,
    pub transient_retries: u64,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
