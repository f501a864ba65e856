//! Bearer credential parsing

use once_cell::sync::Lazy;
use regex::Regex;

/// Exact `Bearer <token>` form; the token is ASCII word characters or hyphens.
static BEARER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Bearer ([A-Za-z0-9_-]+)$").expect("valid bearer regex"));

/// Extract the virtual key from an `Authorization` header value
///
/// Returns `None` for anything that is not exactly `Bearer <token>`.
pub fn extract_virtual_key(auth_header: &str) -> Option<&str> {
    BEARER_PATTERN
        .captures(auth_header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
