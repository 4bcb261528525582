//! Command-line arguments of the two binaries.

use std::time::Duration;

use clap::Parser;

use crate::config::Config;
use crate::handler::SessionConfig;
use crate::loadgen::LoadConfig;
use crate::server::ServerConfig;

/// Initialize `tracing` from `RUST_LOG`, falling back to `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Arguments of the echo server.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsbench")]
#[command(version)]
#[command(about = "WebSocket echo server for benchmarking", long_about = None)]
pub struct ServerArgs {
    /// Port to listen on
    #[arg(
        short,
        long,
        env = "WS_SERVER_PORT",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Close sessions that stay silent this many seconds (disabled when unset)
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,

    /// Largest accepted message in bytes
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl ServerArgs {
    pub fn into_config(self) -> ServerConfig {
        let mut websocket = Config::server();
        if let Some(max) = self.max_message_size {
            websocket = websocket.with_max_message_size(max);
        }
        ServerConfig {
            host: self.host,
            port: self.port,
            session: SessionConfig {
                idle_timeout: self.idle_timeout_secs.map(Duration::from_secs),
            },
            websocket,
        }
    }
}

/// Arguments of the load generator.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsbench-load")]
#[command(version)]
#[command(about = "Load generator for the WebSocket echo server", long_about = None)]
pub struct LoadArgs {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(
        short,
        long,
        env = "WS_SERVER_PORT",
        default_value_t = 3001,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub port: u16,

    /// Upgrade path
    #[arg(long, default_value = "/ws")]
    pub path: String,

    /// Number of clients
    #[arg(short, long, default_value_t = 10)]
    pub clients: usize,

    /// Messages per client (0 = random between 1 and 20)
    #[arg(short, long, default_value_t = 0)]
    pub messages: u32,

    /// Clients connected at the same time
    #[arg(long, default_value_t = 100)]
    pub max_concurrent: usize,

    /// Message content
    #[arg(long, default_value = "Hello, WebSocket!")]
    pub content: String,

    /// Delay between sends on one client, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub interval_ms: u64,

    /// Connect and handshake timeout, in seconds
    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl LoadArgs {
    pub fn into_config(self) -> LoadConfig {
        LoadConfig {
            host: self.host,
            port: self.port,
            path: self.path,
            clients: self.clients,
            messages: self.messages,
            max_concurrent: self.max_concurrent,
            content: self.content,
            interval: Duration::from_millis(self.interval_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            websocket: Config::client(),
        }
    }
}
