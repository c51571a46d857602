//! Background release of timed-out claims.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::OrderCoordinator;
use crate::metrics;

/// Periodically reopens orders whose claim outlived the claim timeout.
pub struct ClaimSweeper {
    coordinator: Arc<OrderCoordinator>,
    interval: Duration,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClaimSweeper {
    pub fn new(coordinator: Arc<OrderCoordinator>, interval: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            coordinator,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn the sweep loop. Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Claim sweeper already running");
            return;
        }

        let running = Arc::clone(&self.running);
        let coordinator = Arc::clone(&self.coordinator);
        let interval = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Claim sweeper started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Claim sweeper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        sweep(&coordinator);
                    }
                }
            }
            info!("Claim sweeper stopped");
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
    }

    /// Stop the loop and wait for an in-flight sweep to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Claim sweeper not running");
            return;
        }

        let _ = self.shutdown_tx.send(());

        let handle = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Claim sweeper task failed: {}", e);
            }
        }
    }

    /// Run one pass immediately. Returns how many claims were released.
    pub fn sweep_once(&self) -> usize {
        sweep(&self.coordinator)
    }
}

fn sweep(coordinator: &OrderCoordinator) -> usize {
    match coordinator.expire_stale_claims(Utc::now()) {
        Ok(expired) => {
            metrics::SWEEPS.with_label_values(&["success"]).inc();
            if expired.is_empty() {
                debug!("No stale claims");
            } else {
                info!(count = expired.len(), "Released stale claims");
            }
            expired.len()
        }
        Err(e) => {
            metrics::SWEEPS.with_label_values(&["error"]).inc();
            error!("Claim sweep failed: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::lifecycle::{LifecycleEngine, OrderAction};
    use crate::order::{OrderCategory, OrderDraft, OrderStatus, SqliteOrderStore};
    use crate::stats::StatsAggregator;
    use rust_decimal::Decimal;

    fn coordinator() -> Arc<OrderCoordinator> {
        let store = Arc::new(SqliteOrderStore::in_memory().unwrap());
        let stats = Arc::new(StatsAggregator::new(store.clone()));
        let engine = LifecycleEngine::new(
            LifecycleConfig::default(),
            Some(chrono::Duration::hours(1)),
        );
        Arc::new(OrderCoordinator::new(
            store.clone(),
            store,
            engine,
            stats,
            None,
        ))
    }

    fn stale_claim(coordinator: &OrderCoordinator) -> String {
        let order = coordinator
            .create(OrderDraft {
                title: "Rename invoices".to_string(),
                description: "Rename PDFs by invoice number".to_string(),
                category: OrderCategory::FileProcessing,
                payment_amount: Decimal::new(40, 0),
                requirements: vec![],
                created_by: "alice".to_string(),
            })
            .unwrap();
        coordinator
            .apply_at(
                &order.id,
                OrderAction::Claim {
                    claimed_by: "dev1".to_string(),
                },
                Utc::now() - chrono::Duration::hours(2),
            )
            .unwrap();
        order.id
    }

    #[test]
    fn test_sweep_once_releases_stale_claim() {
        let c = coordinator();
        let id = stale_claim(&c);
        let sweeper = ClaimSweeper::new(Arc::clone(&c), Duration::from_secs(60));

        assert_eq!(sweeper.sweep_once(), 1);
        assert_eq!(c.get(&id).unwrap().status(), OrderStatus::Open);
        assert_eq!(sweeper.sweep_once(), 0);
    }

    #[tokio::test]
    async fn test_loop_sweeps_and_stops() {
        let c = coordinator();
        let id = stale_claim(&c);
        let sweeper = ClaimSweeper::new(Arc::clone(&c), Duration::from_millis(20));

        sweeper.start();
        assert!(sweeper.is_running());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(c.get(&id).unwrap().status(), OrderStatus::Open);

        sweeper.stop().await;
        assert!(!sweeper.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let sweeper = ClaimSweeper::new(coordinator(), Duration::from_secs(1));
        sweeper.stop().await;
        assert!(!sweeper.is_running());
    }
}
