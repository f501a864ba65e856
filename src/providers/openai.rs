//! OpenAI chat completions client

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, ChatProvider, ProviderKind, ProviderResponse, ProxyRequest, Role, UpstreamClient};
use crate::audit::AuditContext;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
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
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    role: Option<Role>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    total_tokens: u64,
}

/// Client for the OpenAI `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    upstream: UpstreamClient,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(upstream: UpstreamClient, endpoint: &str) -> Self {
        Self {
            upstream,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

/// Native role for a canonical one
///
/// Tool messages need a `tool_call_id` the canonical model does not carry, so
/// they are left out.
fn native_role(role: Role) -> Option<&'static str> {
    match role {
        Role::System => Some("system"),
        Role::Developer => Some("developer"),
        Role::User => Some("user"),
        Role::Assistant => Some("assistant"),
        Role::Tool => None,
    }
}

fn build_request<'a>(model: &'a str, messages: &'a [ChatMessage]) -> WireRequest<'a> {
    WireRequest {
        model,
        messages: messages
            .iter()
            .filter_map(|m| {
                native_role(m.role).map(|role| WireMessage {
                    role,
                    content: &m.content,
                })
            })
            .collect(),
    }
}

fn normalize(response: WireResponse) -> ProviderResponse {
    ProviderResponse {
        choices: response
            .choices
            .into_iter()
            .map(|c| ChatMessage {
                role: c.message.role.unwrap_or(Role::Assistant),
                content: c.message.content.unwrap_or_default(),
            })
            .collect(),
        tokens_used: response.usage.map(|u| u.total_tokens),
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn send_request(
        &self,
        request: &ProxyRequest,
        audit: &AuditContext,
    ) -> AppResult<ProviderResponse> {
        let body = build_request(&request.model, &request.messages);
        debug!(
            model = %request.model,
            forwarded = body.messages.len(),
            dropped = request.messages.len() - body.messages.len(),
            "Sending OpenAI chat completion"
        );

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", request.upstream_api_key))
            .map_err(|_| {
                AppError::Internal(anyhow::anyhow!("Upstream API key is not a valid header value"))
            })?;
        headers.insert(AUTHORIZATION, auth);

        let url = format!("{}/chat/completions", self.endpoint);
        let response: WireResponse = self.upstream.post_json(&url, headers, &body, audit).await?;

        Ok(normalize(response))
    }
}
