//! Audit trail integration tests
//!
//! Entries are written by a background worker, so assertions poll the sink.

use axum::http::StatusCode;
use serde_json::json;

use crate::common::{constants, openai_mocks, test_data, TestHarness};

#[tokio::test]
async fn test_successful_exchange_is_audited() {
    let harness = TestHarness::new().await;
    openai_mocks::mock_chat_completions(&harness.openai).await;

    harness
        .chat(constants::OPENAI_KEY, &test_data::valid_chat_request())
        .await
        .assert_status_ok();

    let entries = harness.audit.wait_for(1).await;
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.status, 200);
    assert_eq!(entry.provider, "openai");
    assert_eq!(entry.virtual_key, constants::OPENAI_KEY);
    assert_eq!(entry.method, "POST");
    assert!(entry.url.ends_with("/chat/completions"));
    assert_eq!(entry.request.as_ref().unwrap()["model"], json!("gpt-4o"));
    assert_eq!(
        entry.response.as_ref().unwrap()["usage"]["total_tokens"],
        json!(18)
    );
    assert!(entry.error.is_none());
    assert_eq!(entry.trace_id.len(), 8);
}

#[tokio::test]
async fn test_upstream_error_is_audited() {
    let harness = TestHarness::new().await;
    openai_mocks::mock_error(&harness.openai, 404, "The model does not exist").await;

    harness
        .chat(constants::OPENAI_KEY, &test_data::valid_chat_request())
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let entries = harness.audit.wait_for(1).await;
    assert_eq!(entries[0].status, 404);
    assert!(entries[0].is_error());
    assert_eq!(
        entries[0].response.as_ref().unwrap()["error"]["message"],
        json!("The model does not exist")
    );
}

#[tokio::test]
async fn test_transport_failure_is_audited_with_status_zero() {
    let harness = TestHarness::with_config(|config| {
        config.openai_endpoint = "http://127.0.0.1:1".to_string();
    })
    .await;

    harness
        .chat(constants::OPENAI_KEY, &test_data::valid_chat_request())
        .await
        .assert_status(StatusCode::BAD_GATEWAY);

    let entries = harness.audit.wait_for(1).await;
    assert_eq!(entries[0].status, 0);
    assert!(entries[0].error.as_deref().unwrap().starts_with("transport error"));
}

#[tokio::test]
async fn test_rejected_requests_are_not_audited() {
    let harness = TestHarness::new().await;

    harness
        .chat("vk_nobody", &test_data::valid_chat_request())
        .await
        .assert_status(StatusCode::FORBIDDEN);
    harness.state.audit.shutdown().await;

    assert!(harness.audit.entries().is_empty());
}

#[tokio::test]
async fn test_shutdown_drains_pending_entries() {
    let harness = TestHarness::new().await;
    openai_mocks::mock_chat_completions(&harness.openai).await;

    for _ in 0..5 {
        harness
            .chat(constants::OPENAI_KEY, &test_data::valid_chat_request())
            .await
            .assert_status_ok();
    }
    harness.state.audit.shutdown().await;

    assert_eq!(harness.audit.entries().len(), 5);
}

#[tokio::test]
async fn test_retried_attempts_are_each_audited() {
    let harness = TestHarness::with_config(|config| config.upstream_max_retries = 1).await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .respond_with(wiremock::ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&harness.openai)
        .await;
    openai_mocks::mock_chat_completions(&harness.openai).await;

    harness
        .chat(constants::OPENAI_KEY, &test_data::valid_chat_request())
        .await
        .assert_status_ok();

    let entries = harness.audit.wait_for(2).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status, 503);
    assert_eq!(entries[1].status, 200);
    // One inbound request, one record
    assert_eq!(harness.state.metrics.get_stats().total_requests, 1);
}
