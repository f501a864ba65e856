//! Health endpoint integration tests

use axum::http::StatusCode;
use serde_json::Value;

use crate::common::TestHarness;

#[tokio::test]
async fn test_health_check() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["virtual_keys"], 3);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let harness = TestHarness::new().await;

    harness
        .server
        .get("/v1/models")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
