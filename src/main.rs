//! wsbench: WebSocket echo server
//!
//! - `GET /` greets plain HTTP clients, or upgrades when asked to
//! - `GET /ws` upgrades to a WebSocket echo session
//! - `GET /metrics` serves Prometheus metrics

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use wsbench::cli::{ServerArgs, init_tracing};
use wsbench::{Metrics, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServerArgs::parse();
    init_tracing(&args.log_level);
    let config = args.into_config();

    info!(
        host = %config.host,
        port = config.port,
        idle_timeout = ?config.session.idle_timeout,
        max_message_size = config.websocket.limits.max_message_size,
        "Starting wsbench server"
    );

    let metrics = Arc::new(Metrics::new()?);
    metrics.register_process_collector()?;

    let server = match Server::bind(config, metrics).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "startup failed");
            return Err(e.into());
        }
    };
    server.serve().await?;
    Ok(())
}
