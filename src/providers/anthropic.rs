//! Anthropic messages API client
//!
//! Anthropic takes the system prompt as a separate top-level field and only
//! accepts `user` and `assistant` turns in `messages`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, ChatProvider, ProviderKind, ProviderResponse, ProxyRequest, Role, UpstreamClient};
use crate::audit::AuditContext;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    content: Vec<WireBlock>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Client for the Anthropic `/v1/messages` endpoint
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    upstream: UpstreamClient,
    endpoint: String,
    version: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(upstream: UpstreamClient, endpoint: &str, version: &str, max_tokens: u32) -> Self {
        Self {
            upstream,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            version: version.to_string(),
            max_tokens,
        }
    }

    fn headers(&self, api_key: &str) -> AppResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-api-key"), header_value(api_key)?);
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            header_value(&self.version)?,
        );
        Ok(headers)
    }
}

fn header_value(value: &str) -> AppResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        AppError::Internal(anyhow::anyhow!("Configured value is not a valid header value"))
    })
}

/// Split messages into the system prompt and the turns Anthropic accepts
///
/// System and developer messages are joined into the system prompt; tool
/// messages have no plain-text equivalent and are dropped.
fn split_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<WireMessage<'_>>) {
    let mut system = Vec::new();
    let mut turns = Vec::new();

    for message in messages {
        match message.role {
            Role::System | Role::Developer => system.push(message.content.as_str()),
            Role::User => turns.push(WireMessage {
                role: "user",
                content: &message.content,
            }),
            Role::Assistant => turns.push(WireMessage {
                role: "assistant",
                content: &message.content,
            }),
            Role::Tool => {}
        }
    }

    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n"))
    };
    (system, turns)
}

fn normalize(response: WireResponse) -> ProviderResponse {
    let text: Vec<String> = response
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .map(|b| b.text)
        .collect();

    ProviderResponse {
        choices: vec![ChatMessage {
            role: Role::Assistant,
            content: text.concat(),
        }],
        tokens_used: response.usage.map(|u| u.input_tokens + u.output_tokens),
    }
}

#[async_trait]
impl ChatProvider for AnthropicClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn send_request(
        &self,
        request: &ProxyRequest,
        audit: &AuditContext,
    ) -> AppResult<ProviderResponse> {
        let (system, messages) = split_messages(&request.messages);
        let body = WireRequest {
            model: &request.model,
            max_tokens: self.max_tokens,
            system,
            messages,
        };
        debug!(
            model = %request.model,
            turns = body.messages.len(),
            has_system = body.system.is_some(),
            "Sending Anthropic message"
        );

        let headers = self.headers(&request.upstream_api_key)?;
        let url = format!("{}/v1/messages", self.endpoint);
        let response: WireResponse = self.upstream.post_json(&url, headers, &body, audit).await?;

        Ok(normalize(response))
    }
}
