//! Load generator: many concurrent clients, each greeted, each echoing.
//!
//! Every client connects, waits for the server greeting, sends its messages
//! one at a time and checks that each echo is byte-identical to what it sent.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::client;
use crate::config::Config;
use crate::connection::Connection;
use crate::error::Error;
use crate::message::{CloseCode, Message};
use crate::proto::{self, CLIENT_ID, SERVER_ID, WebsocketMessage};

/// Upper bound for a randomly chosen per-client message count.
pub const MAX_RANDOM_MESSAGES: u32 = 20;

/// How many distinct error strings a report keeps.
const MAX_REPORTED_ERRORS: usize = 10;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Client-side failures. Each one ends only the client that hit it.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("websocket error: {0}")]
    Transport(#[from] Error),

    #[error("unexpected greeting: {0}")]
    Greeting(String),

    #[error("echo {index} differs from the message sent")]
    EchoMismatch { index: u32 },

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("server closed the connection early")]
    ClosedEarly,
}

/// Parameters of one load run.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub clients: usize,
    /// Messages per client. `0` picks a random count in `1..=20` per client.
    pub messages: u32,
    pub max_concurrent: usize,
    pub content: String,
    /// Delay between consecutive sends on one client.
    pub interval: Duration,
    pub connect_timeout: Duration,
    pub websocket: Config,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3001,
            path: "/ws".into(),
            clients: 10,
            messages: 0,
            max_concurrent: 100,
            content: "Hello, WebSocket!".into(),
            interval: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            websocket: Config::client(),
        }
    }
}

impl LoadConfig {
    fn messages_for_client(&self) -> u32 {
        if self.messages > 0 {
            return self.messages;
        }
        let mut buf = [0u8; 4];
        match getrandom::getrandom(&mut buf) {
            Ok(()) => 1 + u32::from_le_bytes(buf) % MAX_RANDOM_MESSAGES,
            Err(_) => MAX_RANDOM_MESSAGES / 2,
        }
    }
}

#[derive(Default)]
struct LoadStats {
    connected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    messages_sent: AtomicU64,
    echoes_matched: AtomicU64,
    latencies_us: Mutex<Vec<u64>>,
    errors: Mutex<Vec<String>>,
}

impl LoadStats {
    fn record_echo(&self, latency: Duration) {
        self.echoes_matched.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut latencies) = self.latencies_us.lock() {
            latencies.push(latency.as_micros() as u64);
        }
    }

    fn record_failure(&self, err: &LoadError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut errors) = self.errors.lock() {
            let text = err.to_string();
            if errors.len() < MAX_REPORTED_ERRORS && !errors.contains(&text) {
                errors.push(text);
            }
        }
    }
}

/// Round-trip latency distribution, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min: f64,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub max: f64,
}

impl LatencySummary {
    /// Nearest-rank percentiles over microsecond samples.
    #[must_use]
    pub fn from_micros(samples: &mut [u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();
        let ms = |us: u64| us as f64 / 1000.0;
        let rank = |p: f64| {
            let idx = (p * samples.len() as f64).ceil() as usize;
            samples[idx.saturating_sub(1).min(samples.len() - 1)]
        };
        let total: u64 = samples.iter().sum();
        Self {
            min: ms(samples[0]),
            mean: ms(total) / samples.len() as f64,
            p50: ms(rank(0.50)),
            p90: ms(rank(0.90)),
            p99: ms(rank(0.99)),
            max: ms(samples[samples.len() - 1]),
        }
    }
}

/// Outcome of a load run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub clients: usize,
    pub connected: u64,
    pub completed: u64,
    pub failed: u64,
    pub messages_sent: u64,
    pub echoes_matched: u64,
    pub elapsed_secs: f64,
    pub throughput_per_sec: f64,
    pub latency_ms: LatencySummary,
    pub errors: Vec<String>,
}

impl LoadReport {
    /// Every client finished and every echo matched.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
            && self.completed == self.clients as u64
            && self.echoes_matched == self.messages_sent
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Clients:      {} ({} connected, {} completed, {} failed)",
            self.clients, self.connected, self.completed, self.failed
        )?;
        writeln!(
            f,
            "Messages:     {} sent, {} echoed",
            self.messages_sent, self.echoes_matched
        )?;
        writeln!(f, "Duration:     {:.3}s", self.elapsed_secs)?;
        writeln!(f, "Throughput:   {:.1} msg/s", self.throughput_per_sec)?;
        let l = &self.latency_ms;
        writeln!(
            f,
            "Latency (ms): min {:.3}  mean {:.3}  p50 {:.3}  p90 {:.3}  p99 {:.3}  max {:.3}",
            l.min, l.mean, l.p50, l.p90, l.p99, l.max
        )?;
        for err in &self.errors {
            writeln!(f, "Error:        {err}")?;
        }
        Ok(())
    }
}

/// Run all clients and collect the report.
pub async fn run(config: LoadConfig) -> LoadReport {
    let config = Arc::new(config);
    let stats = Arc::new(LoadStats::default());
    let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let started = Instant::now();

    let mut tasks = JoinSet::new();
    for index in 0..config.clients {
        let config = config.clone();
        let stats = stats.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            if let Err(e) = run_client(&config, &stats).await {
                debug!(client = index, error = %e, "client failed");
                stats.record_failure(&e);
            } else {
                stats.completed.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "client task panicked");
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let mut latencies = stats
        .latencies_us
        .lock()
        .map(|l| l.clone())
        .unwrap_or_default();
    let echoes_matched = stats.echoes_matched.load(Ordering::Relaxed);
    LoadReport {
        clients: config.clients,
        connected: stats.connected.load(Ordering::Relaxed),
        completed: stats.completed.load(Ordering::Relaxed),
        failed: stats.failed.load(Ordering::Relaxed),
        messages_sent: stats.messages_sent.load(Ordering::Relaxed),
        echoes_matched,
        elapsed_secs: elapsed,
        throughput_per_sec: if elapsed > 0.0 {
            echoes_matched as f64 / elapsed
        } else {
            0.0
        },
        latency_ms: LatencySummary::from_micros(&mut latencies),
        errors: stats.errors.lock().map(|e| e.clone()).unwrap_or_default(),
    }
}

async fn run_client(config: &LoadConfig, stats: &LoadStats) -> Result<(), LoadError> {
    let mut conn = timeout(
        config.connect_timeout,
        client::connect(&config.host, config.port, &config.path, config.websocket.clone()),
    )
    .await
    .map_err(|_| LoadError::ConnectTimeout(config.connect_timeout))??;
    stats.connected.fetch_add(1, Ordering::Relaxed);

    let greeting = next_binary(&mut conn).await?;
    match proto::decode(&greeting) {
        Ok(msg) if msg == WebsocketMessage::greeting() => {}
        Ok(msg) => return Err(LoadError::Greeting(format!("{msg:?}"))),
        Err(e) => return Err(LoadError::Greeting(e.to_string())),
    }

    let payload = proto::encode(&config.content, CLIENT_ID, SERVER_ID);
    let count = config.messages_for_client();
    for index in 0..count {
        if index > 0 && !config.interval.is_zero() {
            tokio::time::sleep(config.interval).await;
        }
        let sent_at = Instant::now();
        conn.send(Message::binary(payload.clone())).await?;
        stats.messages_sent.fetch_add(1, Ordering::Relaxed);

        let echo = next_binary(&mut conn).await?;
        if echo != payload {
            return Err(LoadError::EchoMismatch { index });
        }
        stats.record_echo(sent_at.elapsed());
    }

    conn.close(CloseCode::Normal, "done").await?;
    // wait briefly for the server's close reply
    let _ = timeout(CLOSE_TIMEOUT, async {
        while let Ok(Some(msg)) = conn.recv().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    })
    .await;
    Ok(())
}

async fn next_binary<T>(conn: &mut Connection<T>) -> Result<Vec<u8>, LoadError>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        match conn.recv().await? {
            Some(Message::Binary(data)) => return Ok(data),
            Some(Message::Ping(_) | Message::Pong(_)) => {}
            Some(Message::Close(_)) | None => return Err(LoadError::ClosedEarly),
            Some(other) => return Err(LoadError::UnexpectedMessage(format!("{other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_summary_percentiles() {
        let mut samples: Vec<u64> = (1..=100).map(|ms| ms * 1000).collect();
        let summary = LatencySummary::from_micros(&mut samples);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.p50, 50.0);
        assert_eq!(summary.p90, 90.0);
        assert_eq!(summary.p99, 99.0);
        assert_eq!(summary.max, 100.0);
        assert!((summary.mean - 50.5).abs() < 1e-9);
    }

    #[test]
    fn test_latency_summary_empty_and_single() {
        assert_eq!(LatencySummary::from_micros(&mut []), LatencySummary::default());
        let single = LatencySummary::from_micros(&mut [2500]);
        assert_eq!(single.p50, 2.5);
        assert_eq!(single.p99, 2.5);
    }

    #[test]
    fn test_random_message_count_in_range() {
        let config = LoadConfig::default();
        for _ in 0..200 {
            let n = config.messages_for_client();
            assert!((1..=MAX_RANDOM_MESSAGES).contains(&n), "{n}");
        }
        let fixed = LoadConfig {
            messages: 7,
            ..LoadConfig::default()
        };
        assert_eq!(fixed.messages_for_client(), 7);
    }

    #[test]
    fn test_random_message_count_covers_range() {
        let config = LoadConfig::default();
        let mut seen = [0u32; MAX_RANDOM_MESSAGES as usize];
        for _ in 0..4000 {
            seen[config.messages_for_client() as usize - 1] += 1;
        }
        // expected 200 per value
        assert!(seen.iter().all(|&n| (100..=300).contains(&n)), "{seen:?}");
    }

    #[test]
    fn test_report_success_and_json() {
        let mut report = LoadReport {
            clients: 2,
            connected: 2,
            completed: 2,
            failed: 0,
            messages_sent: 10,
            echoes_matched: 10,
            elapsed_secs: 1.0,
            throughput_per_sec: 10.0,
            latency_ms: LatencySummary::default(),
            errors: Vec::new(),
        };
        assert!(report.is_success());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["echoes_matched"], 10);
        assert!(json["latency_ms"]["p99"].is_number());

        report.failed = 1;
        assert!(!report.is_success());
        assert!(report.to_string().contains("1 failed"));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_every_client() {
        // bind then drop to get a port nobody listens on
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let report = run(LoadConfig {
            port,
            clients: 3,
            messages: 1,
            connect_timeout: Duration::from_secs(2),
            ..LoadConfig::default()
        })
        .await;
        assert_eq!(report.failed, 3);
        assert_eq!(report.completed, 0);
        assert!(!report.is_success());
        assert!(!report.errors.is_empty());
    }
}
