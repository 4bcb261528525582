//! # wsbench - WebSocket echo benchmark
//!
//! An RFC 6455 echo server that greets each client, echoes every valid
//! protobuf-encoded [`WebsocketMessage`] back verbatim, and exposes
//! Prometheus metrics, together with a load generator that drives it.
//!
//! ## Layout
//!
//! - [`protocol`], [`codec`] and [`connection`]: the WebSocket transport
//! - [`proto`]: the three-field message and its wire encoding
//! - [`handler`]: one echo session per connection
//! - [`metrics`]: counters, gauge and histogram behind an explicit registry
//! - [`server`]: axum routes for `/`, `/ws` and `/metrics`
//! - [`client`] and [`loadgen`]: the load-generating side
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wsbench::{Metrics, Server, ServerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(Metrics::new()?);
//! let server = Server::bind(ServerConfig::new("127.0.0.1", 3001), metrics).await?;
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod loadgen;
pub mod message;
pub mod metrics;
pub mod proto;
pub mod protocol;
pub mod server;

pub use codec::WebSocketCodec;
pub use config::{Config, Limits};
pub use connection::{Connection, ConnectionState, Role};
pub use error::{DecodeError, Error, Result};
pub use handler::{ConnectionId, EchoHandler, SessionConfig, SessionEnd, SessionSummary};
pub use loadgen::{LoadConfig, LoadError, LoadReport};
pub use message::{CloseCode, CloseFrame, Message};
pub use metrics::{Metrics, MetricsSnapshot};
pub use proto::WebsocketMessage;
pub use protocol::{HandshakeRequest, HandshakeResponse, OpCode, WS_GUID, compute_accept_key};
pub use server::{Server, ServerConfig, ServerError};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send_and_sync() {
        assert_send::<Error>();
        assert_sync::<Error>();
        assert_send::<DecodeError>();
        assert_sync::<DecodeError>();
        assert_send::<Metrics>();
        assert_sync::<Metrics>();
        assert_send::<EchoHandler>();
        assert_sync::<EchoHandler>();
        assert_send::<WebsocketMessage>();
        assert_send::<Config>();
        assert_sync::<Limits>();
        assert_send::<Message>();
        assert_sync::<ConnectionState>();
        assert_send::<ServerError>();
        assert_send::<LoadError>();
    }

    #[test]
    fn test_connection_over_tcp_is_send() {
        assert_send::<Connection<tokio::net::TcpStream>>();
    }
}
