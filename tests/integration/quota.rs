//! Quota enforcement integration tests

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;
use wiremock::matchers::method;
use wiremock::{Mock, ResponseTemplate};

use crate::common::{constants, openai_mocks, test_data, TestHarness};

#[tokio::test]
async fn test_request_quota_rejects_with_429() {
    let harness = TestHarness::with_config(|config| config.quota_max_requests = 2).await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(openai_mocks::completion_body("ok", 5)),
        )
        .expect(2)
        .mount(&harness.openai)
        .await;
    let body = test_data::valid_chat_request();

    harness.chat(constants::OPENAI_KEY, &body).await.assert_status_ok();
    harness.chat(constants::OPENAI_KEY, &body).await.assert_status_ok();
    let rejected = harness.chat(constants::OPENAI_KEY, &body).await;

    rejected.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let error: Value = rejected.json();
    assert_eq!(error["code"], "QUOTA_EXCEEDED");
    assert_eq!(error["message"], "request quota exceeded");
    assert_eq!(error["details"]["limit"], 2);
    assert_eq!(error["details"]["used"], 2);

    // Rejected before dispatch: not recorded
    assert_eq!(harness.state.metrics.get_stats().total_requests, 2);
    assert_eq!(harness.state.quota.get_usage(constants::OPENAI_KEY), (2, 10));
}

#[tokio::test]
async fn test_token_quota_rejects_with_429() {
    let harness = TestHarness::with_config(|config| config.quota_max_tokens = 10).await;
    openai_mocks::mock_chat_completions(&harness.openai).await;
    let body = test_data::valid_chat_request();

    harness.chat(constants::OPENAI_KEY, &body).await.assert_status_ok();
    let rejected = harness.chat(constants::OPENAI_KEY, &body).await;

    rejected.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(rejected.json::<Value>()["message"], "token quota exceeded");
}

#[tokio::test]
async fn test_quota_is_per_key() {
    let harness = TestHarness::with_config(|config| config.quota_max_requests = 1).await;
    openai_mocks::mock_chat_completions(&harness.openai).await;
    crate::common::anthropic_mocks::mock_messages(&harness.anthropic).await;

    harness
        .chat(constants::OPENAI_KEY, &test_data::valid_chat_request())
        .await
        .assert_status_ok();
    harness
        .chat(constants::ANTHROPIC_KEY, &test_data::anthropic_chat_request())
        .await
        .assert_status_ok();

    harness
        .chat(constants::OPENAI_KEY, &test_data::valid_chat_request())
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_quota_window_rolls_over() {
    let harness = TestHarness::with_config(|config| {
        config.quota_max_requests = 1;
        config.quota_window = Duration::from_millis(100);
    })
    .await;
    openai_mocks::mock_chat_completions(&harness.openai).await;
    let body = test_data::valid_chat_request();

    harness.chat(constants::OPENAI_KEY, &body).await.assert_status_ok();
    harness
        .chat(constants::OPENAI_KEY, &body)
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    tokio::time::sleep(Duration::from_millis(150)).await;

    harness.chat(constants::OPENAI_KEY, &body).await.assert_status_ok();
}

#[tokio::test]
async fn test_failed_upstream_calls_still_consume_quota() {
    let harness = TestHarness::with_config(|config| config.quota_max_requests = 1).await;
    openai_mocks::mock_error(&harness.openai, 400, "bad model").await;
    let body = test_data::valid_chat_request();

    harness
        .chat(constants::OPENAI_KEY, &body)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    harness
        .chat(constants::OPENAI_KEY, &body)
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}
