//! Virtual key resolution
//!
//! Maps opaque caller-facing bearer tokens to an upstream provider and its
//! real credential.

pub mod credential;
pub mod directory;

pub use credential::extract_virtual_key;
pub use directory::{KeyError, VirtualKeyDirectory, VirtualKeyEntry};
