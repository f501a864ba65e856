//! Metrics aggregator
//!
//! Process-wide request counters behind a single lock. Recording is cheap and
//! never crosses an await point, so one lock for the whole aggregate is enough.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One completed (or failed-after-dispatch) request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMetric {
    pub provider: String,
    pub virtual_key: String,
    pub duration: Duration,
    pub status: u16,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view returned by `GET /metrics`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub requests_per_provider: BTreeMap<String, u64>,
    pub average_response_time_ms: f64,
}

#[derive(Debug, Default)]
struct Aggregate {
    history: Vec<RequestMetric>,
    total_requests: u64,
    provider_counts: BTreeMap<String, u64>,
    total_duration: Duration,
}

/// Aggregates request metrics for the lifetime of the process
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    inner: RwLock<Aggregate>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request
    pub fn record_request(&self, metric: RequestMetric) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        inner.total_requests += 1;
        *inner
            .provider_counts
            .entry(metric.provider.clone())
            .or_insert(0) += 1;
        inner.total_duration += metric.duration;
        inner.history.push(metric);
    }

    /// Compute the current snapshot
    pub fn get_stats(&self) -> MetricsSnapshot {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        let average_response_time_ms = if inner.total_requests > 0 {
            inner.total_duration.as_secs_f64() * 1000.0 / inner.total_requests as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            total_requests: inner.total_requests,
            requests_per_provider: inner.provider_counts.clone(),
            average_response_time_ms,
        }
    }

    /// Recorded metrics in arrival order
    pub fn history(&self) -> Vec<RequestMetric> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .clone()
    }

    /// Clear all counters and history
    pub fn reset(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Aggregate::default();
    }
}
