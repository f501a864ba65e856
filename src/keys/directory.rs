//! Virtual key directory
//!
//! Loaded once at startup and never mutated afterwards.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::KeysFile;
use crate::error::AppError;
use crate::keys::credential::extract_virtual_key;
use crate::providers::ProviderKind;

/// Upstream target of a virtual key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualKeyEntry {
    /// Provider name as configured (`openai`, `anthropic`, ...)
    pub provider: String,
    /// Real upstream credential
    pub upstream_api_key: String,
}

/// Credential resolution failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("missing authorization header")]
    MissingHeader,

    #[error("wrong authorization header format")]
    MalformedHeader,

    #[error("wrong virtual key")]
    UnknownKey,
}

impl From<KeyError> for AppError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::MissingHeader | KeyError::MalformedHeader => {
                AppError::Validation(err.to_string())
            }
            KeyError::UnknownKey => AppError::UnknownVirtualKey,
        }
    }
}

/// Read-only mapping of virtual key to upstream entry
#[derive(Debug, Clone, Default)]
pub struct VirtualKeyDirectory {
    entries: HashMap<String, VirtualKeyEntry>,
}

impl VirtualKeyDirectory {
    /// Build the directory from a parsed keys file
    ///
    /// Entries naming a provider this build does not support are kept; they
    /// fail at dispatch time as internal errors.
    pub fn from_keys_file(file: KeysFile) -> Self {
        let entries: HashMap<String, VirtualKeyEntry> = file
            .virtual_keys
            .into_iter()
            .map(|(key, cfg)| {
                if cfg.provider.parse::<ProviderKind>().is_err() {
                    warn!(
                        virtual_key = %key,
                        provider = %cfg.provider,
                        "Virtual key references an unsupported provider"
                    );
                }
                (
                    key,
                    VirtualKeyEntry {
                        provider: cfg.provider,
                        upstream_api_key: cfg.api_key,
                    },
                )
            })
            .collect();

        info!(keys = entries.len(), "Virtual key directory loaded");
        Self { entries }
    }

    /// Number of configured keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an already-extracted virtual key
    pub fn get(&self, virtual_key: &str) -> Option<&VirtualKeyEntry> {
        self.entries.get(virtual_key)
    }

    /// Resolve an `Authorization` header into its entry and virtual key id
    pub fn resolve(
        &self,
        auth_header: Option<&str>,
    ) -> Result<(VirtualKeyEntry, String), KeyError> {
        let header = auth_header.ok_or(KeyError::MissingHeader)?;
        let virtual_key = extract_virtual_key(header).ok_or(KeyError::MalformedHeader)?;

        let entry = self.get(virtual_key).ok_or_else(|| {
            debug!(virtual_key = %virtual_key, "Unknown virtual key");
            KeyError::UnknownKey
        })?;

        Ok((entry.clone(), virtual_key.to_string()))
    }
}
