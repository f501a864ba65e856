//! Common test utilities for Keyway
//!
//! Builds a full application (router, state, audit logger) against wiremock
//! upstreams, with an in-memory audit sink the tests can inspect.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header, HeaderValue};
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use keyway::audit::LogEntry;
use keyway::{routes, AppState, AuditLogger, AuditSink, Config, KeysFile, VirtualKeyDirectory};

/// Test configuration constants
pub mod constants {
    pub const OPENAI_KEY: &str = "vk_user1_openai";
    pub const ANTHROPIC_KEY: &str = "vk_user2_anthropic";
    /// Points at a provider this build does not support
    pub const BROKEN_KEY: &str = "vk_user3_mistral";

    pub const OPENAI_UPSTREAM_KEY: &str = "sk-openai-upstream";
    pub const ANTHROPIC_UPSTREAM_KEY: &str = "sk-ant-upstream";
}

fn keys_file() -> KeysFile {
    KeysFile::parse(
        r#"{"virtual_keys": {
            "vk_user1_openai": {"provider": "openai", "api_key": "sk-openai-upstream"},
            "vk_user2_anthropic": {"provider": "anthropic", "api_key": "sk-ant-upstream"},
            "vk_user3_mistral": {"provider": "mistral", "api_key": "unused"}
        }}"#,
    )
    .expect("test keys file should parse")
}

/// Audit sink keeping entries in memory
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Poll until `count` entries arrived or two seconds have passed
    pub async fn wait_for(&self, count: usize) -> Vec<LogEntry> {
        for _ in 0..200 {
            let entries = self.entries();
            if entries.len() >= count {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.entries()
    }
}

impl AuditSink for MemorySink {
    fn write(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

/// Complete application wired to mock upstreams
pub struct TestHarness {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub openai: MockServer,
    pub anthropic: MockServer,
    pub audit: Arc<MemorySink>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build the harness, letting the caller adjust configuration first
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let openai = MockServer::start().await;
        let anthropic = MockServer::start().await;

        let mut config = Config::for_endpoints(&openai.uri(), &anthropic.uri());
        adjust(&mut config);

        let audit = Arc::new(MemorySink::default());
        let logger = Arc::new(AuditLogger::new(256, audit.clone()));
        let directory = VirtualKeyDirectory::from_keys_file(keys_file());

        let state = Arc::new(
            AppState::with_parts(config, directory, logger).expect("state should build"),
        );
        let server = TestServer::new(routes::create_router(state.clone()))
            .expect("Failed to create test server");

        Self {
            server,
            state,
            openai,
            anthropic,
            audit,
        }
    }

    /// POST /chat/completions with a bearer virtual key
    pub async fn chat(&self, virtual_key: &str, body: &Value) -> TestResponse {
        self.chat_with_header(&format!("Bearer {}", virtual_key), body)
            .await
    }

    /// POST /chat/completions with a raw Authorization header
    pub async fn chat_with_header(&self, authorization: &str, body: &Value) -> TestResponse {
        self.server
            .post("/chat/completions")
            .add_header(
                header::AUTHORIZATION,
                HeaderValue::from_str(authorization).unwrap(),
            )
            .json(body)
            .await
    }
}

/// Mock OpenAI API responses
pub mod openai_mocks {
    use super::*;

    pub fn completion_body(content: &str, total_tokens: u64) -> Value {
        json!({
            "id": "chatcmpl-test123",
            "object": "chat.completion",
            "created": 1706745600,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": total_tokens / 2,
                "completion_tokens": total_tokens - total_tokens / 2,
                "total_tokens": total_tokens
            }
        })
    }

    /// Successful chat completion with usage
    pub async fn mock_chat_completions(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body("Hello! How can I help you today?", 18)),
            )
            .mount(server)
            .await;
    }

    /// Successful chat completion without a usage block
    pub async fn mock_chat_completions_without_usage(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Sure."}}]
            })))
            .mount(server)
            .await;
    }

    /// Upstream error reply
    pub async fn mock_error(server: &MockServer, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": {"message": message, "type": "invalid_request_error"}
            })))
            .mount(server)
            .await;
    }
}

/// Mock Anthropic API responses
pub mod anthropic_mocks {
    use super::*;

    pub async fn mock_messages(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_test",
                "type": "message",
                "role": "assistant",
                "model": "claude-3-5-sonnet-20241022",
                "content": [{"type": "text", "text": "Hi from Claude"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 12, "output_tokens": 5}
            })))
            .mount(server)
            .await;
    }
}

/// Sample request bodies
pub mod test_data {
    use serde_json::{json, Value};

    pub fn valid_chat_request() -> Value {
        json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Hello, how are you?"}]
        })
    }

    pub fn anthropic_chat_request() -> Value {
        json!({
            "model": "claude-3-5-sonnet-20241022",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hello"}
            ]
        })
    }
}
