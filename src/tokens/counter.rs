//! Token counter implementation
//!
//! Uses tiktoken-rs when the model (or the cl100k fallback) has a known
//! encoding, and a four-characters-per-token approximation otherwise.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;
use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};
use tracing::warn;

use crate::providers::ChatMessage;

/// Fixed per-message overhead (`<|start|>{role}\n{content}<|end|>\n`)
const TOKENS_PER_MESSAGE: u64 = 3;

/// Every reply is primed with `<|start|>assistant<|message|>`
const REPLY_PRIMING_TOKENS: u64 = 3;

/// Token counter with per-model encoder cache
#[derive(Default)]
pub struct TokenCounter {
    encoders: HashMap<String, Option<Arc<CoreBPE>>>,
    /// cl100k, built on first fallback and shared by every unknown model
    fallback: OnceCell<Option<Arc<CoreBPE>>>,
}

impl TokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoder for `model`, falling back to cl100k for unknown models
    fn encoder(&mut self, model: &str) -> Option<Arc<CoreBPE>> {
        let fallback = &self.fallback;
        self.encoders
            .entry(model.to_string())
            .or_insert_with(|| match get_bpe_from_model(model) {
                Ok(bpe) => Some(Arc::new(bpe)),
                Err(e) => {
                    warn!(model = %model, error = %e, "Unknown model, falling back to cl100k encoder");
                    fallback
                        .get_or_init(|| cl100k_base().ok().map(Arc::new))
                        .clone()
                }
            })
            .clone()
    }

    /// Count tokens in a text string
    pub fn count_tokens(&mut self, model: &str, text: &str) -> u64 {
        match self.encoder(model) {
            Some(bpe) => bpe.encode_with_special_tokens(text).len() as u64,
            None => approximate_tokens(text),
        }
    }

    /// Count tokens in a message list, including formatting overhead
    pub fn count_messages(&mut self, model: &str, messages: &[ChatMessage]) -> u64 {
        messages
            .iter()
            .map(|m| {
                TOKENS_PER_MESSAGE
                    + self.count_tokens(model, m.role.as_str())
                    + self.count_tokens(model, &m.content)
            })
            .sum()
    }
}

/// Character-based approximation: one token per four characters, at least one
pub fn approximate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    match chars / 4 {
        0 if chars > 0 => 1,
        n => n,
    }
}

/// Thread-safe token counter shared across handlers
#[derive(Clone, Default)]
pub struct SharedTokenCounter {
    inner: Arc<Mutex<TokenCounter>>,
}

impl SharedTokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate total tokens of an exchange (prompt plus completion)
    ///
    /// Used when the upstream reply carries no usage block.
    pub fn estimate_exchange(
        &self,
        model: &str,
        prompt: &[ChatMessage],
        completion: &[ChatMessage],
    ) -> u64 {
        let mut counter = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let prompt_tokens = counter.count_messages(model, prompt) + REPLY_PRIMING_TOKENS;
        let completion_tokens: u64 = completion
            .iter()
            .map(|m| counter.count_tokens(model, &m.content))
            .sum();

        prompt_tokens + completion_tokens
    }
}
