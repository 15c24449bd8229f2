//! Metrics Collector

use prometheus::{Counter, Gauge, Histogram, Registry, TextEncoder};
use tracing::error;

/// Collects and exports socket facade metrics
pub struct Metrics {
    prometheus_registry: Registry,
    connections_opened_total: Counter,
    connections_closed_total: Counter,
    active_connections: Gauge,
    bytes_written_total: Counter,
    bytes_read_total: Counter,
    io_failures_total: Counter,
    worker_failures_total: Counter,
    throughput: Histogram,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let prometheus_registry = Registry::new();

        let connections_opened_total = Counter::new(
            "btsock_connections_opened_total",
            "Total number of socket connections registered",
        )
        .expect("Failed to create connections_opened_total counter");

        let connections_closed_total = Counter::new(
            "btsock_connections_closed_total",
            "Total number of socket connections closed",
        )
        .expect("Failed to create connections_closed_total counter");

        let active_connections = Gauge::new(
            "btsock_active_connections",
            "Number of currently registered socket connections",
        )
        .expect("Failed to create active_connections gauge");

        let bytes_written_total = Counter::new(
            "btsock_bytes_written_total",
            "Total bytes written to socket connections",
        )
        .expect("Failed to create bytes_written_total counter");

        let bytes_read_total = Counter::new(
            "btsock_bytes_read_total",
            "Total bytes read from socket connections",
        )
        .expect("Failed to create bytes_read_total counter");

        let io_failures_total = Counter::new(
            "btsock_io_failures_total",
            "I/O failures that invalidated a connection",
        )
        .expect("Failed to create io_failures_total counter");

        let worker_failures_total = Counter::new(
            "btsock_worker_failures_total",
            "Connect or accept workers that ended without a connection",
        )
        .expect("Failed to create worker_failures_total counter");

        let throughput = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "btsock_throughput_bytes_per_second",
                "Results of throughput send/read runs",
            )
            .buckets(vec![
                1_000.0, 10_000.0, 50_000.0, 100_000.0, 250_000.0, 1_000_000.0, 10_000_000.0,
            ]),
        )
        .expect("Failed to create throughput histogram");

        prometheus_registry
            .register(Box::new(connections_opened_total.clone()))
            .expect("Failed to register connections_opened_total");
        prometheus_registry
            .register(Box::new(connections_closed_total.clone()))
            .expect("Failed to register connections_closed_total");
        prometheus_registry
            .register(Box::new(active_connections.clone()))
            .expect("Failed to register active_connections");
        prometheus_registry
            .register(Box::new(bytes_written_total.clone()))
            .expect("Failed to register bytes_written_total");
        prometheus_registry
            .register(Box::new(bytes_read_total.clone()))
            .expect("Failed to register bytes_read_total");
        prometheus_registry
            .register(Box::new(io_failures_total.clone()))
            .expect("Failed to register io_failures_total");
        prometheus_registry
            .register(Box::new(worker_failures_total.clone()))
            .expect("Failed to register worker_failures_total");
        prometheus_registry
            .register(Box::new(throughput.clone()))
            .expect("Failed to register throughput");

        Self {
            prometheus_registry,
            connections_opened_total,
            connections_closed_total,
            active_connections,
            bytes_written_total,
            bytes_read_total,
            io_failures_total,
            worker_failures_total,
            throughput,
        }
    }

    pub fn connection_opened(&self) {
        self.connections_opened_total.inc();
        self.active_connections.inc();
    }

    pub fn connection_closed(&self) {
        self.connections_closed_total.inc();
        self.active_connections.dec();
    }

    pub fn record_write(&self, bytes: usize) {
        self.bytes_written_total.inc_by(bytes as f64);
    }

    pub fn record_read(&self, bytes: usize) {
        self.bytes_read_total.inc_by(bytes as f64);
    }

    pub fn record_io_failure(&self) {
        self.io_failures_total.inc();
    }

    pub fn record_worker_failure(&self) {
        self.worker_failures_total.inc();
    }

    pub fn record_throughput(&self, bytes_per_second: u64) {
        self.throughput.observe(bytes_per_second as f64);
    }

    pub fn get_active_connections(&self) -> usize {
        self.active_connections.get().max(0.0) as usize
    }

    pub fn get_total_connections(&self) -> u64 {
        self.connections_opened_total.get() as u64
    }

    pub fn get_bytes_written(&self) -> u64 {
        self.bytes_written_total.get() as u64
    }

    pub fn get_bytes_read(&self) -> u64 {
        self.bytes_read_total.get() as u64
    }

    pub fn get_io_failures(&self) -> u64 {
        self.io_failures_total.get() as u64
    }

    /// Export in the Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();
        match encoder.encode_to_string(&metric_families) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                String::new()
            }
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
