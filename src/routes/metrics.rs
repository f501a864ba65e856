//! Metrics endpoints
//!
//! `GET /metrics` returns the in-process aggregator snapshot as JSON.
//! `GET /metrics/prometheus` exposes the same traffic as Prometheus counters.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::usage::MetricsSnapshot;
use crate::AppState;

/// Process-wide Prometheus handle, set once by `init_metrics`
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder (idempotent)
pub fn init_metrics() -> anyhow::Result<()> {
    PROMETHEUS_HANDLE.get_or_try_init(|| PrometheusBuilder::new().install_recorder())?;
    register_metrics();
    Ok(())
}

fn register_metrics() {
    metrics::describe_counter!(
        "keyway_requests_total",
        "Dispatched chat completion requests by provider and status"
    );
    metrics::describe_histogram!(
        "keyway_request_duration_seconds",
        "Time from dispatch to completion in seconds"
    );
    metrics::describe_counter!("keyway_tokens_total", "Tokens charged against quotas");
    metrics::describe_counter!(
        "keyway_quota_rejections_total",
        "Requests rejected by the quota ledger"
    );
    metrics::describe_counter!(
        "keyway_audit_dropped_total",
        "Audit entries dropped because the queue was full or closed"
    );
}

/// JSON metrics snapshot
pub async fn metrics_snapshot(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.get_stats())
}

/// Prometheus text format for scraping
pub async fn prometheus_metrics() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

/// Record a dispatched request
pub fn record_request(provider: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "keyway_requests_total",
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("keyway_request_duration_seconds", "provider" => provider.to_string())
        .record(duration_secs);
}

/// Record tokens charged to a quota
pub fn record_tokens(provider: &str, count: u64) {
    metrics::counter!("keyway_tokens_total", "provider" => provider.to_string()).increment(count);
}

/// Record a quota rejection
pub fn record_quota_rejection(reason: &str) {
    metrics::counter!("keyway_quota_rejections_total", "reason" => reason.to_string())
        .increment(1);
}

/// Record an audit entry that never reached the sink
pub fn record_audit_dropped() {
    metrics::counter!("keyway_audit_dropped_total").increment(1);
}
