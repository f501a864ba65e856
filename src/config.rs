//! Configuration management for Keyway
//!
//! Runtime settings are loaded from environment variables (optionally seeded
//! from a `.env` file). The virtual key table lives in a separate JSON file
//! whose path is itself configurable.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// `APP_ENV=dev` enables development mode (error details in responses)
    pub development: bool,

    /// Path of the JSON file holding the virtual key table
    pub virtual_keys_path: PathBuf,

    /// OpenAI API base URL
    pub openai_endpoint: String,
    /// Anthropic API base URL (without the version segment)
    pub anthropic_endpoint: String,
    /// Value sent in the `anthropic-version` header
    pub anthropic_version: String,
    /// `max_tokens` sent with every Anthropic request
    pub anthropic_max_tokens: u32,

    /// Connect timeout for upstream calls (TCP + TLS handshake)
    pub upstream_connect_timeout: Duration,
    /// Total timeout for a single upstream call
    pub upstream_request_timeout: Duration,
    /// Retries for transient upstream failures
    pub upstream_max_retries: u32,

    /// Quota: requests allowed per window
    pub quota_max_requests: u64,
    /// Quota: tokens allowed per window
    pub quota_max_tokens: u64,
    /// Quota: window length
    pub quota_window: Duration,

    /// Capacity of the audit log queue
    pub audit_channel_capacity: usize,
    /// Maximum captured response body size per audit entry
    pub audit_body_limit: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("KEYWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("KEYWAY_PORT", "8080")?,
            development: env::var("APP_ENV").map(|v| v == "dev").unwrap_or(false),

            virtual_keys_path: env::var("VIRTUAL_KEYS_PATH")
                .unwrap_or_else(|_| "config/keys.json".to_string())
                .into(),

            openai_endpoint: env::var("OPENAI_ENDPOINT")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            anthropic_endpoint: env::var("ANTHROPIC_ENDPOINT")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            anthropic_version: env::var("ANTHROPIC_VERSION")
                .unwrap_or_else(|_| "2023-06-01".to_string()),
            anthropic_max_tokens: parse_var("ANTHROPIC_MAX_TOKENS", "1024")?,

            upstream_connect_timeout: Duration::from_secs(parse_var(
                "UPSTREAM_CONNECT_TIMEOUT_SECS",
                "10",
            )?),
            upstream_request_timeout: Duration::from_secs(parse_var(
                "UPSTREAM_REQUEST_TIMEOUT_SECS",
                "60",
            )?),
            upstream_max_retries: parse_var("UPSTREAM_MAX_RETRIES", "2")?,

            quota_max_requests: parse_var("QUOTA_MAX_REQUESTS", "100")?,
            quota_max_tokens: parse_var("QUOTA_MAX_TOKENS", "100000")?,
            quota_window: Duration::from_secs(parse_var("QUOTA_WINDOW_SECS", "3600")?),

            audit_channel_capacity: parse_var("AUDIT_CHANNEL_CAPACITY", "1024")?,
            audit_body_limit: parse_var("AUDIT_BODY_LIMIT", "2048")?,
        })
    }

    /// Configuration with every default applied, pointing upstreams at the given URLs
    pub fn for_endpoints(openai_endpoint: &str, anthropic_endpoint: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            development: false,
            virtual_keys_path: PathBuf::from("config/keys.json"),
            openai_endpoint: openai_endpoint.to_string(),
            anthropic_endpoint: anthropic_endpoint.to_string(),
            anthropic_version: "2023-06-01".to_string(),
            anthropic_max_tokens: 1024,
            upstream_connect_timeout: Duration::from_secs(10),
            upstream_request_timeout: Duration::from_secs(60),
            upstream_max_retries: 0,
            quota_max_requests: 100,
            quota_max_tokens: 100_000,
            quota_window: Duration::from_secs(3600),
            audit_channel_capacity: 1024,
            audit_body_limit: 2048,
        }
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", name))
}

/// One configured virtual key as it appears in the keys file
#[derive(Debug, Clone, Deserialize)]
pub struct KeyConfig {
    pub provider: String,
    pub api_key: String,
}

/// Layout of the keys file
#[derive(Debug, Clone, Deserialize)]
pub struct KeysFile {
    pub virtual_keys: HashMap<String, KeyConfig>,
}

impl KeysFile {
    /// Read and parse the keys file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read virtual keys file {}", path.display()))?;
        Self::parse(&raw)
            .with_context(|| format!("Failed to parse virtual keys file {}", path.display()))
    }

    /// Parse keys file contents
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
