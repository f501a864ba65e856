//! Usage metrics module
//!
//! In-process aggregation of per-request telemetry.

pub mod aggregator;

pub use aggregator::{MetricsAggregator, MetricsSnapshot, RequestMetric};
