//! Integration tests for the Keyway gateway
//!
//! Each test drives the real router against wiremock upstreams.

mod audit;
mod health;
mod metrics;
mod quota;
