//! Metrics Module
//!
//! Prometheus counters for connections, bytes and failures.

pub mod collector;

pub use collector::Metrics;
