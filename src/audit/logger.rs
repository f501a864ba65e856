//! Background audit logger
//!
//! Entries are queued on a bounded channel and written by a single worker task.
//! `submit` never blocks: when the queue is full the entry is dropped and
//! counted. `shutdown` closes the queue and drains whatever is still buffered
//! before the worker exits.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::entry::LogEntry;
use crate::routes::metrics::record_audit_dropped;

/// Destination for completed audit entries
pub trait AuditSink: Send + Sync + 'static {
    fn write(&self, entry: &LogEntry);
}

/// Writes entries through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn write(&self, entry: &LogEntry) {
        let payload = match serde_json::to_string(entry) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize audit entry");
                return;
            }
        };

        if entry.is_error() {
            error!(
                target: "keyway::audit",
                trace_id = %entry.trace_id,
                provider = %entry.provider,
                status = entry.status,
                duration_ms = entry.duration_ms,
                entry = %payload,
                "Upstream call failed"
            );
        } else {
            info!(
                target: "keyway::audit",
                trace_id = %entry.trace_id,
                provider = %entry.provider,
                status = entry.status,
                duration_ms = entry.duration_ms,
                entry = %payload,
                "Upstream call completed"
            );
        }
    }
}

/// Non-blocking audit logger with a defined shutdown drain
pub struct AuditLogger {
    sender: mpsc::Sender<LogEntry>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AuditLogger {
    /// Create a logger writing to `sink`
    ///
    /// Spawns the worker task, so this must be called inside a Tokio runtime.
    pub fn new(capacity: usize, sink: Arc<dyn AuditSink>) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = tokio::spawn(Self::background_worker(receiver, sink, shutdown_rx));

        Self {
            sender,
            shutdown: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Create a logger writing through `tracing`
    pub fn with_tracing(capacity: usize) -> Self {
        Self::new(capacity, Arc::new(TracingSink))
    }

    /// Queue an entry (fire-and-forget)
    pub fn submit(&self, entry: LogEntry) {
        if let Err(e) = self.sender.try_send(entry) {
            match e {
                mpsc::error::TrySendError::Full(entry) => {
                    record_audit_dropped();
                    warn!(
                        trace_id = %entry.trace_id,
                        provider = %entry.provider,
                        "Audit log queue full, dropping entry"
                    );
                }
                mpsc::error::TrySendError::Closed(entry) => {
                    record_audit_dropped();
                    warn!(
                        trace_id = %entry.trace_id,
                        provider = %entry.provider,
                        "Audit logger is shut down, dropping entry"
                    );
                }
            }
        }
    }

    /// Stop accepting entries, write everything already queued, then return
    pub async fn shutdown(&self) {
        let signal = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(signal) = signal {
            let _ = signal.send(());
        }

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Audit logger worker terminated abnormally");
            }
        }
    }

    async fn background_worker(
        mut receiver: mpsc::Receiver<LogEntry>,
        sink: Arc<dyn AuditSink>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                maybe_entry = receiver.recv() => {
                    match maybe_entry {
                        Some(entry) => sink.write(&entry),
                        None => break,
                    }
                }
                _ = &mut shutdown => {
                    receiver.close();
                    let mut drained = 0usize;
                    while let Some(entry) = receiver.recv().await {
                        sink.write(&entry);
                        drained += 1;
                    }
                    info!(drained, "Audit logger drained");
                    break;
                }
            }
        }
    }
}
