//! Command-line entry point.
//!
//! ```text
//! topology-discovery [--config FILE] [--address HOST:PORT]
//! ```
//!
//! Without `--config`, settings come from `TOPOLOGY_DISCOVERY_*` environment
//! variables on top of the defaults. Argument errors exit with status 2, like
//! configuration errors.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use topology_discovery::config::DiscoveryConfig;
use topology_discovery::service::DiscoveryClient;
use topology_discovery::utils::logging::init_logging;

#[derive(Debug, Parser)]
#[clap(name = "topology-discovery", about = "Discover a network topology and report it to the server.")]
struct Opts {
    /// TOML configuration file. Without it, TOPOLOGY_DISCOVERY_* variables apply.
    #[clap(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Topology server address, overriding the configured one
    #[clap(long, value_name = "HOST:PORT")]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = Opts::parse();

    let config = match load_config(opts) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{e}");
        return ExitCode::from(2);
    }

    let client = match DiscoveryClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::from(2);
        }
    };

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, aborting discovery");
            let _ = shutdown_tx.send(()).await;
        }
    });

    match client.run_with_shutdown(shutdown_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Topology discovery failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(opts: Opts) -> topology_discovery::Result<DiscoveryConfig> {
    let mut config = match opts.config {
        Some(path) => DiscoveryConfig::from_file(path)?,
        None => DiscoveryConfig::from_env()?,
    };

    if let Some(address) = opts.address {
        config.client.address = address;
    }

    Ok(config)
}
