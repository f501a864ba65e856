//! Keyway - virtual-key gateway for LLM providers
//!
//! Callers authenticate with an opaque virtual key. Keyway maps it to a real
//! upstream credential, enforces a per-key quota, dispatches the chat
//! completion to the configured provider and records metrics and an audit
//! trail of every upstream exchange.

pub mod audit;
pub mod config;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod providers;
pub mod quota;
pub mod routes;
pub mod tokens;
pub mod usage;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

pub use crate::audit::{AuditLogger, AuditSink};
pub use crate::config::{Config, KeysFile};
pub use crate::keys::VirtualKeyDirectory;
pub use crate::providers::UpstreamClient;
pub use crate::quota::{QuotaLedger, QuotaLimits};
pub use crate::tokens::SharedTokenCounter;
pub use crate::usage::MetricsAggregator;

/// Application state shared across all request handlers
///
/// Every service is constructed here and passed by reference; nothing is a
/// lazily initialized global.
pub struct AppState {
    pub config: Config,
    pub start_time: Instant,
    /// Virtual key table, read-only after startup
    pub keys: Arc<VirtualKeyDirectory>,
    pub quota: Arc<QuotaLedger>,
    pub metrics: Arc<MetricsAggregator>,
    /// Background audit logger, drained on shutdown
    pub audit: Arc<AuditLogger>,
    /// Audited HTTP client shared by all providers
    pub upstream: UpstreamClient,
    /// Token estimator for replies without usage
    pub token_counter: SharedTokenCounter,
}

impl AppState {
    /// Create the application state, loading the virtual key table from disk
    ///
    /// Must be called inside a Tokio runtime (the audit worker is spawned here).
    pub fn new(config: Config) -> Result<Self> {
        let keys = KeysFile::load(&config.virtual_keys_path)?;
        let directory = VirtualKeyDirectory::from_keys_file(keys);
        let audit = Arc::new(AuditLogger::with_tracing(config.audit_channel_capacity));
        Self::with_parts(config, directory, audit)
    }

    /// Create the state from an already-built directory and audit logger
    pub fn with_parts(
        config: Config,
        directory: VirtualKeyDirectory,
        audit: Arc<AuditLogger>,
    ) -> Result<Self> {
        let quota = Arc::new(QuotaLedger::new(QuotaLimits {
            max_requests: config.quota_max_requests,
            max_tokens: config.quota_max_tokens,
            window: config.quota_window,
        }));
        let upstream = UpstreamClient::new(&config, Arc::clone(&audit))?;

        Ok(Self {
            config,
            start_time: Instant::now(),
            keys: Arc::new(directory),
            quota,
            metrics: Arc::new(MetricsAggregator::new()),
            audit,
            upstream,
            token_counter: SharedTokenCounter::new(),
        })
    }
}
