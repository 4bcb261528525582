//! Per-connection echo session.
//!
//! One [`EchoHandler::run`] call drives one upgraded connection from the
//! greeting to its end, keeping the shared [`Metrics`] up to date.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::metrics::Metrics;
use crate::proto::{self, WebsocketMessage};

/// Opaque identity of one session, shown as hex in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// A random id. Falls back to a process-local sequence if the OS random
    /// source is unavailable.
    pub fn random() -> Self {
        static FALLBACK: AtomicU64 = AtomicU64::new(1);
        let mut buf = [0u8; 8];
        match getrandom::getrandom(&mut buf) {
            Ok(()) => Self(u64::from_le_bytes(buf)),
            Err(_) => Self(FALLBACK.fetch_add(1, Ordering::Relaxed)),
        }
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Session behaviour that is not part of the WebSocket protocol itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Close the session with 1001 when no message arrives for this long.
    pub idle_timeout: Option<Duration>,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Close handshake or end of stream.
    Closed,
    /// The idle timeout fired and the server closed with Going Away.
    IdleTimeout,
    /// A transport or protocol error ended the session.
    Errored(Error),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Closed => f.write_str("closed"),
            SessionEnd::IdleTimeout => f.write_str("idle timeout"),
            SessionEnd::Errored(e) => write!(f, "error: {e}"),
        }
    }
}

/// Counts for one finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: ConnectionId,
    pub received: u64,
    pub echoed: u64,
    pub decode_errors: u64,
    pub end: SessionEnd,
}

/// Keeps the active-connection gauge raised while alive.
struct ActiveConnection<'a>(&'a Metrics);

impl<'a> ActiveConnection<'a> {
    fn enter(metrics: &'a Metrics) -> Self {
        metrics.connection_opened();
        Self(metrics)
    }
}

impl Drop for ActiveConnection<'_> {
    fn drop(&mut self) {
        self.0.connection_closed();
    }
}

/// Greets, then echoes every decodable binary message back verbatim.
#[derive(Debug, Clone)]
pub struct EchoHandler {
    metrics: Arc<Metrics>,
    config: SessionConfig,
}

impl EchoHandler {
    pub fn new(metrics: Arc<Metrics>, config: SessionConfig) -> Self {
        Self { metrics, config }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run a session to completion.
    pub async fn run<T>(&self, id: ConnectionId, mut conn: Connection<T>) -> SessionSummary
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let _active = ActiveConnection::enter(&self.metrics);
        let started = Instant::now();
        info!(conn = %id, "connection opened");

        let mut summary = SessionSummary {
            id,
            received: 0,
            echoed: 0,
            decode_errors: 0,
            end: SessionEnd::Closed,
        };

        let end = match self.session(id, &mut conn, &mut summary).await {
            Ok(end) => end,
            Err(e) => {
                self.metrics.connection_error();
                warn!(conn = %id, error = %e, "connection failed");
                conn.fail(&e).await;
                SessionEnd::Errored(e)
            }
        };
        summary.end = end;
        let _ = conn.shutdown().await;

        info!(
            conn = %id,
            received = summary.received,
            echoed = summary.echoed,
            decode_errors = summary.decode_errors,
            elapsed_ms = started.elapsed().as_millis() as u64,
            end = %summary.end,
            "connection closed"
        );
        summary
    }

    async fn session<T>(
        &self,
        id: ConnectionId,
        conn: &mut Connection<T>,
        summary: &mut SessionSummary,
    ) -> Result<SessionEnd>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        conn.send(Message::Binary(WebsocketMessage::greeting().encode())).await?;

        loop {
            let next = match self.config.idle_timeout {
                Some(window) => match tokio::time::timeout(window, conn.recv()).await {
                    Ok(next) => next?,
                    Err(_) => {
                        debug!(conn = %id, ?window, "idle timeout");
                        conn.close(CloseCode::GoingAway, "idle timeout").await?;
                        return Ok(SessionEnd::IdleTimeout);
                    }
                },
                None => conn.recv().await?,
            };

            match next {
                Some(Message::Binary(data)) => self.echo(id, conn, data, summary).await?,
                Some(Message::Text(text)) => {
                    debug!(conn = %id, len = text.len(), "ignoring text message");
                }
                Some(Message::Close(frame)) => {
                    debug!(conn = %id, ?frame, "peer closed");
                    return Ok(SessionEnd::Closed);
                }
                Some(Message::Ping(_) | Message::Pong(_)) => {}
                None => return Ok(SessionEnd::Closed),
            }
        }
    }

    async fn echo<T>(
        &self,
        id: ConnectionId,
        conn: &mut Connection<T>,
        data: Vec<u8>,
        summary: &mut SessionSummary,
    ) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let received_at = Instant::now();
        self.metrics.message_received();
        summary.received += 1;

        match proto::decode(&data) {
            Ok(msg) => {
                debug!(
                    conn = %id,
                    content = %msg.content,
                    sender_id = %msg.sender_id,
                    receiver_id = %msg.receiver_id,
                    "message received"
                );
                conn.send(Message::Binary(data)).await?;
                self.metrics.message_sent();
                self.metrics.observe_response_time(received_at.elapsed());
                summary.echoed += 1;
            }
            Err(e) => {
                self.metrics.message_error();
                summary.decode_errors += 1;
                warn!(conn = %id, len = data.len(), error = %e, "dropping undecodable message");
            }
        }
        Ok(())
    }
}
