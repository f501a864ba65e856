//! Chat completions endpoint
//!
//! Validates the inbound payload, then hands it to the request pipeline. This
//! is the single boundary where `AppError` becomes an HTTP response.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::{
    error::{AppError, AppResult},
    pipeline::{self, ChatCompletion},
    providers::{ChatMessage, ProviderResponse, Role},
    AppState,
};

/// Upper bound on messages per request
pub const MAX_MESSAGES: usize = 100;

/// Upper bound on characters per message content
pub const MAX_CONTENT_CHARS: usize = 255;

/// Inbound message as sent by the client
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

/// Inbound chat completion payload
///
/// Every field is optional here so that missing fields are reported per field
/// instead of as one deserialization error.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    pub messages: Option<Vec<InboundMessage>>,
}

impl ChatCompletionRequest {
    /// Check the payload and convert it into the canonical model
    pub fn validate(self) -> AppResult<ChatCompletion> {
        let mut errors = BTreeMap::new();

        let model = match self.model {
            Some(model) if !model.trim().is_empty() => model,
            _ => {
                errors.insert("model".to_string(), "model is required".to_string());
                String::new()
            }
        };

        let inbound = self.messages.unwrap_or_default();
        if inbound.is_empty() {
            errors.insert(
                "messages".to_string(),
                "at least one message is required".to_string(),
            );
        } else if inbound.len() > MAX_MESSAGES {
            errors.insert(
                "messages".to_string(),
                format!("at most {} messages are allowed", MAX_MESSAGES),
            );
        }

        let mut messages = Vec::with_capacity(inbound.len());
        for (i, message) in inbound.into_iter().enumerate() {
            let role = match message.role.as_deref().map(parse_role) {
                Some(Some(role)) => Some(role),
                Some(None) => {
                    errors.insert(
                        format!("messages[{}].role", i),
                        "role must be one of system, developer, user, assistant, tool".to_string(),
                    );
                    None
                }
                None => {
                    errors.insert(format!("messages[{}].role", i), "role is required".to_string());
                    None
                }
            };

            let content = match message.content {
                Some(content) if content.chars().count() > MAX_CONTENT_CHARS => {
                    errors.insert(
                        format!("messages[{}].content", i),
                        format!("content must be at most {} characters", MAX_CONTENT_CHARS),
                    );
                    None
                }
                Some(content) if !content.is_empty() => Some(content),
                _ => {
                    errors.insert(
                        format!("messages[{}].content", i),
                        "content is required".to_string(),
                    );
                    None
                }
            };

            if let (Some(role), Some(content)) = (role, content) {
                messages.push(ChatMessage { role, content });
            }
        }

        if !errors.is_empty() {
            return Err(AppError::InvalidFields(errors));
        }

        Ok(ChatCompletion { model, messages })
    }
}

fn parse_role(role: &str) -> Option<Role> {
    match role {
        "system" => Some(Role::System),
        "developer" => Some(Role::Developer),
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "tool" => Some(Role::Tool),
        _ => None,
    }
}

/// `POST /chat/completions`
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle(&state, &headers, &body).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            log_error(&err);
            err.into_response_with_mode(state.config.development)
        }
    }
}

async fn handle(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<ProviderResponse> {
    let request: ChatCompletionRequest = serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("invalid JSON body: {}", e)))?;
    let completion = request.validate()?;

    let authorization = match headers.get(header::AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| {
            AppError::Validation("wrong authorization header format".to_string())
        })?),
        None => None,
    };

    pipeline::process(state, authorization, completion).await
}

/// Upstream failures were already logged by the audit transport
fn log_error(err: &AppError) {
    if err.is_internal() {
        error!(error = ?err, "Request failed with internal error");
    } else if err.is_upstream() {
        debug!(error = %err, status = err.status_code().as_u16(), "Upstream provider error");
    } else {
        warn!(code = err.code(), error = %err, "Request rejected");
    }
}
