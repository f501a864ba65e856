//! Upstream provider abstraction
//!
//! The pipeline works on one canonical request/response model. Each supported
//! provider turns it into its own wire format, performs the call through the
//! shared [`UpstreamClient`] and normalizes the reply. Supported providers form
//! a closed set: adding one means a new [`ProviderKind`] variant, which the
//! compiler then forces through every match below.

pub mod anthropic;
pub mod openai;
pub mod upstream;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audit::AuditContext;
use crate::config::Config;
use crate::error::{AppError, AppResult};

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
pub use upstream::UpstreamClient;

/// Supported upstream providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(AppError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message role in the canonical model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Developer => "developer",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Canonical request handed to a provider
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Provider name from the virtual key entry
    pub provider: String,
    pub upstream_api_key: String,
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub virtual_key: String,
}

/// Canonical provider reply, returned to the caller as-is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub choices: Vec<ChatMessage>,
    /// Tokens reported by the upstream; the pipeline fills in an estimate when
    /// the reply had no usage block
    pub tokens_used: Option<u64>,
}

/// Capability shared by every provider client
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Perform one chat completion upstream
    async fn send_request(
        &self,
        request: &ProxyRequest,
        audit: &AuditContext,
    ) -> AppResult<ProviderResponse>;
}

/// Provider selected for one request
#[derive(Debug, Clone)]
pub enum Provider {
    OpenAi(OpenAiClient),
    Anthropic(AnthropicClient),
}

impl Provider {
    /// Select the client for `request.provider`
    ///
    /// An unknown provider is a configuration error and maps to an internal
    /// error, never a validation error.
    pub fn from_request(
        request: &ProxyRequest,
        upstream: &UpstreamClient,
        config: &Config,
    ) -> AppResult<Self> {
        let provider = match request.provider.parse::<ProviderKind>()? {
            ProviderKind::OpenAi => Provider::OpenAi(OpenAiClient::new(
                upstream.clone(),
                &config.openai_endpoint,
            )),
            ProviderKind::Anthropic => Provider::Anthropic(AnthropicClient::new(
                upstream.clone(),
                &config.anthropic_endpoint,
                &config.anthropic_version,
                config.anthropic_max_tokens,
            )),
        };
        Ok(provider)
    }
}

#[async_trait]
impl ChatProvider for Provider {
    fn kind(&self) -> ProviderKind {
        match self {
            Provider::OpenAi(client) => client.kind(),
            Provider::Anthropic(client) => client.kind(),
        }
    }

    async fn send_request(
        &self,
        request: &ProxyRequest,
        audit: &AuditContext,
    ) -> AppResult<ProviderResponse> {
        match self {
            Provider::OpenAi(client) => client.send_request(request, audit).await,
            Provider::Anthropic(client) => client.send_request(request, audit).await,
        }
    }
}
