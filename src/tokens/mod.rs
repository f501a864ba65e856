//! Token counting module
//!
//! Estimates token usage with tiktoken-rs when an upstream reply has none.

pub mod counter;

pub use counter::{approximate_tokens, SharedTokenCounter, TokenCounter};
