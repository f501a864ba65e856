//! Quota accounting module
//!
//! Per-virtual-key request and token ceilings over fixed time windows.

pub mod ledger;

pub use ledger::{QuotaExceeded, QuotaLedger, QuotaLimits};
