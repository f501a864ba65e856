//! Audit logging for outbound provider calls
//!
//! The transport wrapper captures each upstream exchange and hands a
//! `LogEntry` to a background logger, keeping log output off the response path.

pub mod entry;
pub mod logger;
pub mod transport;

pub use entry::LogEntry;
pub use logger::{AuditLogger, AuditSink, TracingSink};
pub use transport::{AuditContext, AuditTransport, AuditedResponse};
