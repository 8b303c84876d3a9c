//! GELF relay - TCP ingest to HTTP forwarding bridge
//!
//! Accepts GELF-over-TCP log streams, frames the concatenated JSON records,
//! and POSTs each one to a configured HTTP endpoint.
//!
//! # Usage
//!
//! ```bash
//! # Run with a config file
//! gelf-relay --config configs/example.toml
//!
//! # Or configure the endpoint directly
//! gelf-relay --endpoint-url https://ingest.example.com/logs
//! GELF_RELAY_ENDPOINT=https://ingest.example.com/logs gelf-relay
//! ```

mod dispatch;
mod server;

#[cfg(test)]
mod server_test;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use relay_config::Config;
use relay_forward::{Forwarder, ForwarderConfig};
use relay_metrics::RelayMetrics;

use crate::dispatch::Dispatcher;
use crate::server::RelayServer;

/// GELF relay - TCP ingest to HTTP forwarding bridge
#[derive(Parser, Debug)]
#[command(name = "gelf-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Downstream endpoint URL (overrides the config file)
    #[arg(long, env = "GELF_RELAY_ENDPOINT")]
    endpoint_url: Option<String>,

    /// Listen host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(endpoint) = cli.endpoint_url {
        config.forward.endpoint_url = Some(endpoint);
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    let endpoint = config.forward.require_endpoint()?.to_owned();
    let forwarder = Forwarder::new(
        ForwarderConfig::new(endpoint)
            .with_request_timeout(config.forward.request_timeout)
            .with_retry_attempts(config.forward.retry_attempts)
            .with_retry_base_delay(config.forward.retry_base_delay),
    )?;

    let metrics = Arc::new(RelayMetrics::new(config.metrics.interval));
    let dispatcher = Arc::new(Dispatcher::new(
        forwarder,
        Arc::clone(&metrics),
        config.metrics.enabled,
    ));

    tracing::info!(
        address = %config.server.bind_address(),
        endpoint = dispatcher.endpoint(),
        "starting GELF relay"
    );

    let cancel = CancellationToken::new();
    let server = RelayServer::new(config.server.clone(), Arc::clone(&dispatcher));
    let mut server_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { server.run(cancel).await }
    });

    tokio::select! {
        result = &mut server_task => {
            // The server only returns on its own for fatal errors (bind)
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, draining connections");
            cancel.cancel();
            server_task.await??;
        }
    }

    dispatcher.report_final();
    Ok(())
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
