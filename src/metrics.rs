//! Prometheus metrics for the echo server.
//!
//! A [`Metrics`] value owns its own [`Registry`] and is shared by `Arc`
//! between the HTTP layer and every connection task.

use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

const NAMESPACE: &str = "websocket";

/// Response-time histogram buckets, in seconds.
pub const RESPONSE_TIME_BUCKETS: [f64; 7] = [0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Content type of [`Metrics::render`] output.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Server-wide counters, gauge and histogram.
#[derive(Clone)]
pub struct Metrics {
    messages_received: IntCounter,
    messages_sent: IntCounter,
    active_connections: IntGauge,
    response_time: Histogram,
    connection_errors: IntCounter,
    message_errors: IntCounter,
    registry: Registry,
}

/// Point-in-time copy of every metric value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub active_connections: i64,
    pub connection_errors: u64,
    pub message_errors: u64,
    pub response_time_count: u64,
    pub response_time_sum: f64,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    IntCounter::with_opts(Opts::new(name, help).namespace(NAMESPACE))
}

impl Metrics {
    /// Create the metric set and register it on a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if a metric descriptor is invalid.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let messages_received = counter("messages_received_total", "Total messages received")?;
        let messages_sent = counter("messages_sent_total", "Total messages sent")?;
        let connection_errors = counter("connection_errors_total", "Total connection errors")?;
        let message_errors = counter(
            "message_errors_total",
            "Total messages that failed to decode",
        )?;
        let active_connections = IntGauge::with_opts(
            Opts::new("active_connections", "Number of active WebSocket connections")
                .namespace(NAMESPACE),
        )?;
        let response_time = Histogram::with_opts(
            HistogramOpts::new(
                "server_response_time_seconds",
                "Time from receiving a message to echoing it, in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(RESPONSE_TIME_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(messages_received.clone()))?;
        registry.register(Box::new(messages_sent.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(response_time.clone()))?;
        registry.register(Box::new(connection_errors.clone()))?;
        registry.register(Box::new(message_errors.clone()))?;

        Ok(Self {
            messages_received,
            messages_sent,
            active_connections,
            response_time,
            connection_errors,
            message_errors,
            registry,
        })
    }

    /// Add CPU, memory and file-descriptor metrics of this process.
    ///
    /// # Errors
    ///
    /// Fails if called twice on the same registry.
    #[cfg(target_os = "linux")]
    pub fn register_process_collector(&self) -> Result<(), prometheus::Error> {
        let collector = prometheus::process_collector::ProcessCollector::for_self();
        self.registry.register(Box::new(collector))
    }

    /// No process metrics outside Linux.
    #[cfg(not(target_os = "linux"))]
    pub fn register_process_collector(&self) -> Result<(), prometheus::Error> {
        Ok(())
    }

    pub fn connection_opened(&self) {
        self.active_connections.inc();
    }

    pub fn connection_closed(&self) {
        self.active_connections.dec();
    }

    pub fn connection_error(&self) {
        self.connection_errors.inc();
    }

    pub fn message_received(&self) {
        self.messages_received.inc();
    }

    pub fn message_sent(&self) {
        self.messages_sent.inc();
    }

    pub fn message_error(&self) {
        self.message_errors.inc();
    }

    pub fn observe_response_time(&self, elapsed: Duration) {
        self.response_time.observe(elapsed.as_secs_f64());
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.get()
    }

    /// Current values of all metrics owned by this set.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.get(),
            messages_sent: self.messages_sent.get(),
            active_connections: self.active_connections.get(),
            connection_errors: self.connection_errors.get(),
            message_errors: self.message_errors.get(),
            response_time_count: self.response_time.get_sample_count(),
            response_time_sum: self.response_time.get_sample_sum(),
        }
    }

    /// Prometheus text exposition of everything in the registry.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if encoding fails.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
