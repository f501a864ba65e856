//! Shared upstream HTTP client
//!
//! One `reqwest::Client` (connect and total timeouts from config) wrapped in
//! the audit transport. Transient failures are retried with exponential
//! backoff; everything else is translated into `AppError::Upstream` so the HTTP
//! boundary can tell it apart from internal and validation failures.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument, warn};

use crate::audit::{AuditContext, AuditLogger, AuditTransport};
use crate::config::Config;
use crate::error::{AppError, AppResult};

/// First retry delay
const INITIAL_BACKOFF_MS: u64 = 100;

/// Upper bound for a single retry delay
const MAX_BACKOFF_MS: u64 = 2_000;

/// Audited HTTP client used by every provider
#[derive(Clone)]
pub struct UpstreamClient {
    transport: AuditTransport,
    max_retries: u32,
}

impl fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl UpstreamClient {
    /// Build the shared client from configuration
    pub fn new(config: &Config, logger: Arc<AuditLogger>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.upstream_connect_timeout)
            .timeout(config.upstream_request_timeout)
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            transport: AuditTransport::new(client, logger, config.audit_body_limit),
            max_retries: config.upstream_max_retries,
        })
    }

    /// POST a JSON body and decode a JSON reply
    #[instrument(skip(self, headers, body, audit), fields(trace_id = %audit.trace_id, provider = %audit.provider))]
    pub async fn post_json<B, R>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
        audit: &AuditContext,
    ) -> AppResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = Bytes::from(serde_json::to_vec(body)?);
        let mut attempt = 0u32;

        loop {
            let request = self
                .transport
                .client()
                .post(url)
                .headers(headers.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(payload.clone())
                .build()
                .context("Failed to build upstream request")?;

            match self.send(request, audit).await {
                Ok((status, bytes)) if status.is_success() => {
                    debug!(status = status.as_u16(), attempt, "Upstream call succeeded");
                    return serde_json::from_slice(&bytes).map_err(|e| {
                        AppError::Internal(
                            anyhow::Error::new(e).context("Failed to decode upstream response"),
                        )
                    });
                }
                Ok((status, bytes)) => {
                    if attempt < self.max_retries && is_retryable_status(status) {
                        warn!(status = status.as_u16(), attempt, "Retrying upstream call");
                        tokio::time::sleep(backoff(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(status_error(status, &bytes));
                }
                Err(e) => {
                    if attempt < self.max_retries && (e.is_connect() || e.is_timeout()) {
                        warn!(error = %e, attempt, "Retrying upstream call after transport error");
                        tokio::time::sleep(backoff(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(transport_error(e));
                }
            }
        }
    }

    /// Execute one attempt and drain the body
    async fn send(
        &self,
        request: reqwest::Request,
        audit: &AuditContext,
    ) -> Result<(StatusCode, Bytes), reqwest::Error> {
        let response = self.transport.execute(request, audit).await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        Ok((status, bytes))
    }
}

/// Delay before retry number `attempt + 1`
fn backoff(attempt: u32) -> Duration {
    let ms = INITIAL_BACKOFF_MS
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(MAX_BACKOFF_MS);
    Duration::from_millis(ms)
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Non-2xx upstream reply
fn status_error(status: StatusCode, body: &[u8]) -> AppError {
    AppError::Upstream {
        status: status.as_u16(),
        message: upstream_message(status, body),
    }
}

/// Connection, TLS or timeout failure before a reply arrived
fn transport_error(e: reqwest::Error) -> AppError {
    let status = if e.is_timeout() {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        StatusCode::BAD_GATEWAY
    };
    AppError::Upstream {
        status: status.as_u16(),
        message: format!("upstream request failed: {}", e),
    }
}

/// Pull a human-readable message out of an upstream error body
///
/// Both OpenAI and Anthropic use `{"error": {"message": ...}}`.
fn upstream_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let error = &value["error"];
        if let Some(message) = error["message"].as_str().or_else(|| error.as_str()) {
            return message.to_string();
        }
    }

    let raw = String::from_utf8_lossy(body);
    let raw = raw.trim();
    if raw.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("upstream error")
            .to_string()
    } else {
        raw.to_string()
    }
}
