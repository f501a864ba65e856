//! Metrics endpoint integration tests

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{anthropic_mocks, constants, openai_mocks, test_data, TestHarness};

#[tokio::test]
async fn test_metrics_empty() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/metrics").await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({
            "total_requests": 0,
            "requests_per_provider": {},
            "average_response_time_ms": 0.0
        })
    );
}

#[tokio::test]
async fn test_metrics_aggregate_by_provider() {
    let harness = TestHarness::new().await;
    openai_mocks::mock_chat_completions(&harness.openai).await;
    anthropic_mocks::mock_messages(&harness.anthropic).await;

    for _ in 0..2 {
        harness
            .chat(constants::OPENAI_KEY, &test_data::valid_chat_request())
            .await
            .assert_status_ok();
    }
    harness
        .chat(constants::ANTHROPIC_KEY, &test_data::anthropic_chat_request())
        .await
        .assert_status_ok();

    let body: Value = harness.server.get("/metrics").await.json();

    assert_eq!(body["total_requests"], 3);
    assert_eq!(
        body["requests_per_provider"],
        json!({"openai": 2, "anthropic": 1})
    );
    assert!(body["average_response_time_ms"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_prometheus_endpoint() {
    keyway::routes::metrics::init_metrics().unwrap();
    let harness = TestHarness::new().await;
    openai_mocks::mock_chat_completions(&harness.openai).await;

    harness
        .chat(constants::OPENAI_KEY, &test_data::valid_chat_request())
        .await
        .assert_status_ok();

    let response = harness.server.get("/metrics/prometheus").await;

    response.assert_status_ok();
    let text = response.text();
    assert!(text.contains("keyway_requests_total"));
    assert!(text.contains("provider=\"openai\""));
}
