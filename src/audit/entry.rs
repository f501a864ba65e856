//! Audit log entry

use serde::Serialize;
use serde_json::Value;

/// Appended to a captured body that exceeded the capture limit
pub const TRUNCATION_MARKER: &str = "...(truncated)";

/// One upstream exchange
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub virtual_key: String,
    pub provider: String,
    pub method: String,
    pub url: String,
    /// Upstream status, `0` when no response was received
    pub status: u16,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEntry {
    /// Transport failures and non-success statuses
    pub fn is_error(&self) -> bool {
        self.status == 0 || self.status >= 400 || self.error.is_some()
    }
}

/// Body as JSON when it parses, otherwise as (lossy) text
pub fn body_value(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Captured body value, marking it when the capture was cut short
pub fn captured_value(bytes: &[u8], truncated: bool) -> Value {
    if truncated {
        let mut text = String::from_utf8_lossy(bytes).into_owned();
        text.push_str(TRUNCATION_MARKER);
        Value::String(text)
    } else {
        body_value(bytes)
    }
}
