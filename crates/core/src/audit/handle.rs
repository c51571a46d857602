use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::AuditEvent;
use crate::metrics;

/// Envelope wrapping an audit event with metadata
#[derive(Debug, Clone)]
pub struct AuditEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
}

impl AuditEventEnvelope {
    fn now(event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Handle for emitting audit events
///
/// Cheaply cloneable. Events go through a bounded channel to the
/// [`AuditWriter`](super::AuditWriter); emission never fails the caller.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditEventEnvelope>,
}

impl AuditHandle {
    /// Create a new audit handle from a channel sender
    pub fn new(tx: mpsc::Sender<AuditEventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an event, waiting for channel capacity if needed.
    pub async fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.tx.send(AuditEventEnvelope::now(event)).await {
            metrics::AUDIT_EVENTS_DROPPED.inc();
            tracing::error!("Failed to emit audit event: {}", e);
        }
    }

    /// Emit without waiting. Used from synchronous code paths such as the
    /// order coordinator.
    ///
    /// Returns false (and counts the drop) if the channel is full or closed.
    pub fn try_emit(&self, event: AuditEvent) -> bool {
        match self.tx.try_send(AuditEventEnvelope::now(event)) {
            Ok(()) => true,
            Err(e) => {
                metrics::AUDIT_EVENTS_DROPPED.inc();
                tracing::error!("Failed to emit audit event: {}", e);
                false
            }
        }
    }

    /// Emit a batch in order, stopping at the first failure.
    pub fn try_emit_all(&self, events: impl IntoIterator<Item = AuditEvent>) -> bool {
        events.into_iter().all(|event| self.try_emit(event))
    }
}
