use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditStore};
use crate::metrics;

/// Most envelopes taken off the channel per wake-up.
const BATCH_SIZE: usize = 64;

impl From<AuditEventEnvelope> for AuditRecord {
    fn from(envelope: AuditEventEnvelope) -> Self {
        Self {
            id: 0,
            timestamp: envelope.timestamp,
            event_type: envelope.event.event_type().to_string(),
            order_id: envelope.event.order_id().map(String::from),
            user_id: envelope.event.user_id().map(String::from),
            data: envelope.event,
        }
    }
}

/// Drains the audit channel into an [`AuditStore`].
///
/// A failed insert is logged and counted; the writer keeps going. It stops
/// once every [`AuditHandle`] is gone and the channel is empty, so events
/// emitted before shutdown are still persisted.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    pub async fn run(mut self) {
        info!("Audit writer started");

        let mut batch = Vec::with_capacity(BATCH_SIZE);
        let (mut written, mut failed) = (0u64, 0u64);

        while self.rx.recv_many(&mut batch, BATCH_SIZE).await > 0 {
            for envelope in batch.drain(..) {
                if self.persist(AuditRecord::from(envelope)) {
                    written += 1;
                } else {
                    failed += 1;
                }
            }
        }

        info!(written, failed, "Audit writer stopped");
    }

    fn persist(&self, record: AuditRecord) -> bool {
        match self.store.insert(&record) {
            Ok(_) => {
                metrics::AUDIT_EVENTS_WRITTEN.with_label_values(&["ok"]).inc();
                true
            }
            Err(e) => {
                metrics::AUDIT_EVENTS_WRITTEN
                    .with_label_values(&["error"])
                    .inc();
                error!(
                    event_type = %record.event_type,
                    order_id = record.order_id.as_deref().unwrap_or("-"),
                    "Failed to write audit event: {}",
                    e
                );
                false
            }
        }
    }
}

/// Wire a bounded audit channel of `buffer_size` to `store`.
///
/// Clone the handle into producers and `tokio::spawn(writer.run())`.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::audit::{AuditError, AuditEvent, AuditFilter};

    /// In-memory store; rejects events of `reject_type` when set.
    #[derive(Default)]
    struct RecordingStore {
        records: Mutex<Vec<AuditRecord>>,
        reject_type: Option<&'static str>,
    }

    impl RecordingStore {
        fn rejecting(event_type: &'static str) -> Self {
            Self {
                reject_type: Some(event_type),
                ..Default::default()
            }
        }

        fn event_types(&self) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.event_type.clone())
                .collect()
        }
    }

    impl AuditStore for RecordingStore {
        fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
            if self.reject_type == Some(record.event_type.as_str()) {
                return Err(AuditError::Database("disk full".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            records.push(record.clone());
            Ok(records.len() as i64)
        }

        fn query(&self, _filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
            Ok(self.records.lock().unwrap().clone())
        }

        fn count(&self, _filter: &AuditFilter) -> Result<i64, AuditError> {
            Ok(self.records.lock().unwrap().len() as i64)
        }
    }

    fn spawn_writer(
        store: &Arc<RecordingStore>,
        buffer: usize,
    ) -> (AuditHandle, tokio::task::JoinHandle<()>) {
        let (handle, writer) =
            create_audit_system(Arc::clone(store) as Arc<dyn AuditStore>, buffer);
        (handle, tokio::spawn(writer.run()))
    }

    fn claimed(order_id: &str, by: &str) -> AuditEvent {
        AuditEvent::OrderClaimed {
            order_id: order_id.to_string(),
            claimed_by: by.to_string(),
        }
    }

    #[test]
    fn test_record_from_envelope_extracts_ids() {
        let record = AuditRecord::from(AuditEventEnvelope {
            timestamp: chrono::Utc::now(),
            event: AuditEvent::OrderRated {
                order_id: "o-123".to_string(),
                rating_id: "r-1".to_string(),
                rated_by: "bob".to_string(),
                rating: 5,
                rating_count: 1,
                average_rating: 5.0,
            },
        });

        assert_eq!(record.id, 0);
        assert_eq!(record.event_type, "order_rated");
        assert_eq!(record.order_id.as_deref(), Some("o-123"));
        assert_eq!(record.user_id.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_failed_insert_does_not_stop_the_writer() {
        let store = Arc::new(RecordingStore::rejecting("order_claimed"));
        let (handle, task) = spawn_writer(&store, 10);

        handle.emit(claimed("o-1", "dev1")).await;
        handle
            .emit(AuditEvent::ServiceStopped {
                reason: "test".to_string(),
            })
            .await;
        drop(handle);

        task.await.unwrap();
        assert_eq!(store.event_types(), vec!["service_stopped"]);
    }

    #[tokio::test]
    async fn test_writer_runs_until_last_handle_drops() {
        let store = Arc::new(RecordingStore::default());
        let (main_handle, task) = spawn_writer(&store, 10);
        let sweeper_handle = main_handle.clone();

        main_handle.try_emit(claimed("o-1", "dev1"));
        drop(main_handle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished(), "writer exited with a handle alive");

        sweeper_handle.try_emit(AuditEvent::ClaimReleased {
            order_id: "o-1".to_string(),
            claimed_by: "dev1".to_string(),
            expired: true,
        });
        drop(sweeper_handle);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("writer did not stop")
            .unwrap();
        assert_eq!(store.event_types(), vec!["order_claimed", "claim_released"]);
        // expired releases have no acting user
        assert_eq!(store.records.lock().unwrap()[1].user_id, None);
    }

    #[tokio::test]
    async fn test_backlog_larger_than_a_batch_is_drained_in_order() {
        let store = Arc::new(RecordingStore::default());
        let (handle, writer) =
            create_audit_system(Arc::clone(&store) as Arc<dyn AuditStore>, BATCH_SIZE * 3);

        for i in 0..BATCH_SIZE * 2 + 5 {
            handle.try_emit(claimed(&format!("o-{}", i), "dev1"));
        }
        drop(handle);

        // everything is queued before the writer starts
        writer.run().await;

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), BATCH_SIZE * 2 + 5);
        assert_eq!(records[0].order_id.as_deref(), Some("o-0"));
        assert_eq!(
            records.last().unwrap().order_id,
            Some(format!("o-{}", BATCH_SIZE * 2 + 4))
        );
    }
}
