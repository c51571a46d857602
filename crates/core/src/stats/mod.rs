//! Marketplace-wide statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::order::{Order, OrderError, OrderFilter, OrderStatus, OrderStore};

/// Headline numbers for the marketplace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub total_orders: u64,
    pub open_orders: u64,
    pub completed_orders: u64,
    /// Sum of every bounty ever posted, regardless of status.
    pub total_value: Decimal,
}

impl MarketStats {
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        orders
            .into_iter()
            .fold(MarketStats::default(), |mut stats, order| {
                stats.total_orders += 1;
                match order.status() {
                    OrderStatus::Open => stats.open_orders += 1,
                    OrderStatus::Completed => stats.completed_orders += 1,
                    _ => {}
                }
                stats.total_value += order.payment_amount;
                stats
            })
    }
}

/// Computes [`MarketStats`] by scanning the order store.
///
/// The last result is cached until a writer calls [`invalidate`](Self::invalidate).
/// Each invalidation bumps a generation counter; a scan only populates the
/// cache if no invalidation happened while it ran.
pub struct StatsAggregator {
    store: Arc<dyn OrderStore>,
    generation: AtomicU64,
    cache: RwLock<Option<(u64, MarketStats)>>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            generation: AtomicU64::new(0),
            cache: RwLock::new(None),
        }
    }

    /// Mark the cached figures as outdated.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Result<MarketStats, OrderError> {
        let generation = self.generation.load(Ordering::SeqCst);

        if let Ok(cache) = self.cache.read() {
            if let Some((cached_at, stats)) = cache.as_ref() {
                if *cached_at == generation {
                    return Ok(stats.clone());
                }
            }
        }

        let orders = self.store.list(&OrderFilter::all())?;
        let stats = MarketStats::from_orders(&orders);
        debug!(total_orders = stats.total_orders, "Recomputed market stats");

        if self.generation.load(Ordering::SeqCst) == generation {
            if let Ok(mut cache) = self.cache.write() {
                *cache = Some((generation, stats.clone()));
            }
        }

        Ok(stats)
    }
}
