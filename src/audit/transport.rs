//! Audit transport
//!
//! Wraps the outbound `reqwest::Client`. Each call records the request body,
//! times the round trip and tees the response body into a bounded side buffer
//! as the caller drains it. The entry is handed to the logger when the body is
//! exhausted or dropped; the bytes seen by the caller are never altered.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use tracing::debug;

use super::entry::{captured_value, LogEntry};
use super::logger::AuditLogger;

/// Stream type for upstream response bodies
type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Who an outbound call is made for
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub trace_id: String,
    pub provider: String,
    pub virtual_key: String,
}

/// Outbound transport that audits every exchange
#[derive(Clone)]
pub struct AuditTransport {
    client: reqwest::Client,
    logger: Arc<AuditLogger>,
    body_limit: usize,
}

impl AuditTransport {
    pub fn new(client: reqwest::Client, logger: Arc<AuditLogger>, body_limit: usize) -> Self {
        Self {
            client,
            logger,
            body_limit,
        }
    }

    /// Underlying client, for building requests
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Send `request` and return a response whose body is captured for the audit log
    pub async fn execute(
        &self,
        request: reqwest::Request,
        ctx: &AuditContext,
    ) -> Result<AuditedResponse, reqwest::Error> {
        let mut entry = LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            trace_id: ctx.trace_id.clone(),
            virtual_key: ctx.virtual_key.clone(),
            provider: ctx.provider.clone(),
            method: request.method().to_string(),
            url: request.url().to_string(),
            status: 0,
            duration_ms: 0,
            request: request
                .body()
                .and_then(|b| b.as_bytes())
                .map(|bytes| capped_value(bytes, self.body_limit)),
            response: None,
            error: None,
        };

        let start = Instant::now();
        let result = self.client.execute(request).await;
        entry.duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Err(e) => {
                entry.error = Some(format!("transport error: {}", e));
                self.logger.submit(entry);
                Err(e)
            }
            Ok(response) => {
                entry.status = response.status().as_u16();
                debug!(
                    trace_id = %entry.trace_id,
                    status = entry.status,
                    duration_ms = entry.duration_ms,
                    "Upstream responded"
                );

                let status = response.status();
                let body = CapturingStream::new(
                    Box::pin(response.bytes_stream()),
                    entry,
                    Arc::clone(&self.logger),
                    self.body_limit,
                );

                Ok(AuditedResponse { status, body })
            }
        }
    }
}

/// Request body as logged, cut at `limit` bytes like the response side
fn capped_value(bytes: &[u8], limit: usize) -> serde_json::Value {
    let n = bytes.len().min(limit);
    captured_value(&bytes[..n], bytes.len() > n)
}

/// Upstream response whose body is observed by the audit log
pub struct AuditedResponse {
    status: StatusCode,
    body: CapturingStream,
}

impl AuditedResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Read the whole body
    pub async fn bytes(self) -> Result<Bytes, reqwest::Error> {
        let mut stream = self.body;
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }
}

/// Body stream that copies up to `limit` bytes into a side buffer
struct CapturingStream {
    inner: ByteStream,
    captured: Vec<u8>,
    truncated: bool,
    limit: usize,
    pending: Option<(LogEntry, Arc<AuditLogger>)>,
}

impl CapturingStream {
    fn new(inner: ByteStream, entry: LogEntry, logger: Arc<AuditLogger>, limit: usize) -> Self {
        Self {
            inner,
            captured: Vec::new(),
            truncated: false,
            limit,
            pending: Some((entry, logger)),
        }
    }

    fn observe(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.captured.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.captured.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    /// Complete the entry and hand it to the logger (once)
    fn finish(&mut self, error: Option<String>) {
        if let Some((mut entry, logger)) = self.pending.take() {
            if !self.captured.is_empty() {
                entry.response = Some(captured_value(&self.captured, self.truncated));
            }
            if error.is_some() {
                entry.error = error;
            }
            logger.submit(entry);
        }
    }
}

impl Stream for CapturingStream {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.observe(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish(Some(format!("response body error: {}", e)));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish(None);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for CapturingStream {
    fn drop(&mut self) {
        self.finish(None);
    }
}
