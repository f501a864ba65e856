//! Request pipeline
//!
//! resolve key -> check quota -> dispatch -> record metrics -> increment quota.
//!
//! Recording is owned by [`DispatchGuard`], armed right before the provider is
//! selected. Its `Drop` runs on success, on an error return and on unwinding,
//! so every dispatched request is recorded exactly once. Failures before
//! dispatch (credential, quota) leave no record.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::AuditContext;
use crate::error::AppResult;
use crate::providers::{ChatMessage, ChatProvider, Provider, ProviderResponse, ProxyRequest};
use crate::quota::QuotaLedger;
use crate::routes::metrics::{record_quota_rejection, record_request, record_tokens};
use crate::usage::{MetricsAggregator, RequestMetric};
use crate::AppState;

/// Status recorded when the guard drops without an explicit outcome
const UNRECORDED_STATUS: u16 = 500;

/// A validated inbound chat completion
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Always-record finalizer for one dispatched request
pub struct DispatchGuard {
    quota: Arc<QuotaLedger>,
    metrics: Arc<MetricsAggregator>,
    provider: String,
    virtual_key: String,
    started: Instant,
    status: Option<u16>,
    tokens: u64,
}

impl DispatchGuard {
    pub fn arm(
        quota: Arc<QuotaLedger>,
        metrics: Arc<MetricsAggregator>,
        provider: &str,
        virtual_key: &str,
    ) -> Self {
        Self {
            quota,
            metrics,
            provider: provider.to_string(),
            virtual_key: virtual_key.to_string(),
            started: Instant::now(),
            status: None,
            tokens: 0,
        }
    }

    /// Set the final status and the tokens to charge
    pub fn complete(&mut self, status: u16, tokens: u64) {
        self.status = Some(status);
        self.tokens = tokens;
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        let duration = self.started.elapsed();
        let status = self.status.unwrap_or(UNRECORDED_STATUS);

        self.metrics.record_request(RequestMetric {
            provider: self.provider.clone(),
            virtual_key: self.virtual_key.clone(),
            duration,
            status,
            timestamp: Utc::now(),
        });
        self.quota.increment_request(&self.virtual_key, self.tokens);

        record_request(&self.provider, status, duration.as_secs_f64());
        if self.tokens > 0 {
            record_tokens(&self.provider, self.tokens);
        }

        debug!(
            provider = %self.provider,
            virtual_key = %self.virtual_key,
            status,
            tokens = self.tokens,
            duration_ms = duration.as_millis() as u64,
            "Request recorded"
        );
    }
}

/// Run one chat completion through the pipeline
pub async fn process(
    state: &AppState,
    authorization: Option<&str>,
    completion: ChatCompletion,
) -> AppResult<ProviderResponse> {
    let (entry, virtual_key) = state.keys.resolve(authorization)?;

    if let Err(exceeded) = state.quota.check_quota(&virtual_key) {
        record_quota_rejection(&exceeded.to_string());
        warn!(virtual_key = %virtual_key, reason = %exceeded, "Quota exceeded");
        return Err(exceeded.into());
    }

    let request = ProxyRequest {
        provider: entry.provider,
        upstream_api_key: entry.upstream_api_key,
        messages: completion.messages,
        model: completion.model,
        virtual_key,
    };
    let audit = AuditContext {
        trace_id: Uuid::new_v4().to_string()[..8].to_string(),
        provider: request.provider.clone(),
        virtual_key: request.virtual_key.clone(),
    };

    let mut guard = DispatchGuard::arm(
        Arc::clone(&state.quota),
        Arc::clone(&state.metrics),
        &request.provider,
        &request.virtual_key,
    );

    let outcome = dispatch(state, &request, &audit).await;
    match outcome {
        Ok(mut response) => {
            let tokens = match response.tokens_used {
                Some(tokens) => tokens,
                None => state.token_counter.estimate_exchange(
                    &request.model,
                    &request.messages,
                    &response.choices,
                ),
            };
            response.tokens_used = Some(tokens);
            guard.complete(200, tokens);

            info!(
                trace_id = %audit.trace_id,
                provider = %request.provider,
                model = %request.model,
                tokens,
                "Chat completion served"
            );
            Ok(response)
        }
        Err(err) => {
            guard.complete(err.status_code().as_u16(), 0);
            Err(err)
        }
    }
}

async fn dispatch(
    state: &AppState,
    request: &ProxyRequest,
    audit: &AuditContext,
) -> AppResult<ProviderResponse> {
    let provider = Provider::from_request(request, &state.upstream, &state.config)?;
    provider.send_request(request, audit).await
}
