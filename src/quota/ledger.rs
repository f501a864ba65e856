//! Quota ledger implementation
//!
//! Each virtual key owns one entry guarded by its own mutex, so requests for
//! different keys never contend. Entries are created lazily on first access.
//!
//! Windows are fixed, not sliding: any check or increment that finds the
//! current window expired resets the entry in place before proceeding. A window
//! boundary crossed between a check and its increment therefore resets the
//! counters the increment lands on.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::error::AppError;

/// Ceilings applied to every key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    /// Maximum requests per window
    pub max_requests: u64,
    /// Maximum tokens per window
    pub max_tokens: u64,
    /// Window length
    pub window: Duration,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            max_requests: 100,
            max_tokens: 100_000,
            window: Duration::from_secs(3600),
        }
    }
}

/// Reason a quota check was denied
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuotaExceeded {
    #[error("request quota exceeded")]
    Requests { limit: u64, used: u64 },

    #[error("token quota exceeded")]
    Tokens { limit: u64, used: u64 },
}

impl From<QuotaExceeded> for AppError {
    fn from(err: QuotaExceeded) -> Self {
        let (limit, used) = match err {
            QuotaExceeded::Requests { limit, used } | QuotaExceeded::Tokens { limit, used } => {
                (limit, used)
            }
        };
        AppError::QuotaExceeded {
            message: err.to_string(),
            limit,
            used,
        }
    }
}

/// Usage counters for one virtual key
#[derive(Debug)]
struct QuotaEntry {
    request_count: u64,
    token_usage: u64,
    window_start: Instant,
}

impl QuotaEntry {
    fn new(now: Instant) -> Self {
        Self {
            request_count: 0,
            token_usage: 0,
            window_start: now,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.duration_since(self.window_start) >= window
    }

    /// Start a fresh window if the current one has expired
    fn roll_window(&mut self, now: Instant, window: Duration) {
        if self.is_expired(now, window) {
            self.request_count = 0;
            self.token_usage = 0;
            self.window_start = now;
        }
    }
}

/// Per-key quota ledger
pub struct QuotaLedger {
    entries: DashMap<String, Arc<Mutex<QuotaEntry>>>,
    limits: RwLock<QuotaLimits>,
}

impl QuotaLedger {
    /// Create a ledger with the given limits
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            entries: DashMap::new(),
            limits: RwLock::new(limits),
        }
    }

    /// Current limits
    pub fn limits(&self) -> QuotaLimits {
        *self.limits.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the limits used by all future window evaluations
    ///
    /// Counters already accumulated in open windows are left untouched.
    pub fn set_limits(&self, max_requests: u64, max_tokens: u64, window: Duration) {
        let mut limits = self.limits.write().unwrap_or_else(PoisonError::into_inner);
        *limits = QuotaLimits {
            max_requests,
            max_tokens,
            window,
        };
    }

    /// Drop every entry
    pub fn reset(&self) {
        self.entries.clear();
    }

    /// Check whether `virtual_key` may issue another request
    pub fn check_quota(&self, virtual_key: &str) -> Result<(), QuotaExceeded> {
        let limits = self.limits();
        let entry = self.entry(virtual_key);
        let mut entry = entry.lock().unwrap_or_else(PoisonError::into_inner);

        entry.roll_window(Instant::now(), limits.window);

        if entry.request_count >= limits.max_requests {
            return Err(QuotaExceeded::Requests {
                limit: limits.max_requests,
                used: entry.request_count,
            });
        }

        if entry.token_usage >= limits.max_tokens {
            return Err(QuotaExceeded::Tokens {
                limit: limits.max_tokens,
                used: entry.token_usage,
            });
        }

        Ok(())
    }

    /// Record one request and its token usage
    ///
    /// Does not re-check ceilings.
    pub fn increment_request(&self, virtual_key: &str, tokens: u64) {
        let limits = self.limits();
        let entry = self.entry(virtual_key);
        let mut entry = entry.lock().unwrap_or_else(PoisonError::into_inner);

        entry.roll_window(Instant::now(), limits.window);
        entry.request_count += 1;
        entry.token_usage = entry.token_usage.saturating_add(tokens);

        debug!(
            virtual_key = %virtual_key,
            requests = entry.request_count,
            tokens = entry.token_usage,
            "Quota usage incremented"
        );
    }

    /// Current `(requests, tokens)` for a key
    ///
    /// Unknown keys and expired windows report zero. This never creates or
    /// resets an entry.
    pub fn get_usage(&self, virtual_key: &str) -> (u64, u64) {
        let Some(entry) = self.entries.get(virtual_key).map(|e| Arc::clone(e.value())) else {
            return (0, 0);
        };
        let window = self.limits().window;
        let entry = entry.lock().unwrap_or_else(PoisonError::into_inner);

        if entry.is_expired(Instant::now(), window) {
            return (0, 0);
        }

        (entry.request_count, entry.token_usage)
    }

    /// Get or atomically create the entry for a key
    fn entry(&self, virtual_key: &str) -> Arc<Mutex<QuotaEntry>> {
        if let Some(entry) = self.entries.get(virtual_key) {
            return Arc::clone(entry.value());
        }

        let entry = self
            .entries
            .entry(virtual_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(QuotaEntry::new(Instant::now()))));
        Arc::clone(entry.value())
    }
}

impl Default for QuotaLedger {
    fn default() -> Self {
        Self::new(QuotaLimits::default())
    }
}
