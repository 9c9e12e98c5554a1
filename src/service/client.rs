use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::config::DiscoveryConfig;
use crate::error::Result;
use crate::protocol::discovery::DiscoverySession;
use crate::transport;
use crate::utils::metrics::{Metrics, Timer};

/// Connects to the topology server and runs one discovery session per call
pub struct DiscoveryClient {
    config: DiscoveryConfig,
    metrics: Arc<Metrics>,
}

impl DiscoveryClient {
    /// Validate `config` and build a client from it
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        config.validate_strict()?;
        Ok(Self {
            config,
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Counters shared by every session this client runs
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Discover the topology and report it to the server
    pub async fn run(&self) -> Result<()> {
        self.run_inner(None).await
    }

    /// Like [`run`](Self::run), aborting when `shutdown_rx` fires
    pub async fn run_with_shutdown(&self, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        self.run_inner(Some(shutdown_rx)).await
    }

    #[instrument(skip(self, shutdown_rx), fields(address = %self.config.client.address))]
    async fn run_inner(&self, shutdown_rx: Option<mpsc::Receiver<()>>) -> Result<()> {
        let _timer = Timer::start("discovery_session");

        let framed = transport::connect(&self.config.client, &self.config.transport).await?;
        info!("Connected to topology server");

        let mut session = DiscoverySession::new(framed)
            .with_response_timeout(self.config.client.response_timeout)
            .with_metrics(Arc::clone(&self.metrics));

        let result = match shutdown_rx {
            Some(rx) => session.run_with_shutdown(rx).await,
            None => session.run().await,
        };

        // The client always initiates closure, whatever the outcome
        let mut stream = session.into_inner().into_inner();
        if let Err(e) = stream.shutdown().await {
            warn!(error = %e, "Failed to close connection cleanly");
        }

        self.metrics.log_metrics();
        result
    }
}
