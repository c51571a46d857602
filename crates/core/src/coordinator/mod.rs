//! Order transition coordinator.
//!
//! The only component that writes orders. Every mutating action runs as
//! read, decide, write inside a per-order critical section:
//!
//! ```text
//! lock(id) -> store.get -> [ledger.has_rated] -> engine.decide -> store.put | ledger.append -> unlock
//!                                                                              |
//!                                            stats.invalidate, metrics, audit <+
//! ```
//!
//! Writes carry the version read at the start of the section, so a writer in
//! another process sharing the database surfaces as `Conflict` instead of a
//! lost update.

mod locks;
mod sweeper;

pub use locks::OrderLocks;
pub use sweeper::ClaimSweeper;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::lifecycle::{DecisionContext, LifecycleEngine, OrderAction, Transition};
use crate::metrics;
use crate::order::{
    Order, OrderDraft, OrderError, OrderFilter, OrderState, OrderStatus, OrderStore, Rating,
    RatingLedger,
};
use crate::stats::StatsAggregator;

/// Serializes and commits all order mutations.
pub struct OrderCoordinator {
    store: Arc<dyn OrderStore>,
    ledger: Arc<dyn RatingLedger>,
    engine: LifecycleEngine,
    stats: Arc<StatsAggregator>,
    audit: Option<AuditHandle>,
    locks: OrderLocks,
}

impl OrderCoordinator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        ledger: Arc<dyn RatingLedger>,
        engine: LifecycleEngine,
        stats: Arc<StatsAggregator>,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            store,
            ledger,
            engine,
            stats,
            audit,
            locks: OrderLocks::new(),
        }
    }

    pub fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    /// Validate and store a new open order.
    pub fn create(&self, draft: OrderDraft) -> Result<Order, OrderError> {
        let draft = draft.trimmed();
        self.engine.validate_draft(&draft)?;

        let order = self.store.create(draft)?;

        metrics::ORDERS_CREATED.inc();
        self.stats.invalidate();
        info!(
            order_id = %order.id,
            created_by = %order.created_by,
            category = %order.category,
            payment_amount = %order.payment_amount,
            "Order created"
        );
        self.emit(vec![AuditEvent::OrderCreated {
            order_id: order.id.clone(),
            created_by: order.created_by.clone(),
            title: order.title.clone(),
            category: order.category,
            payment_amount: order.payment_amount,
        }]);

        Ok(order)
    }

    pub fn get(&self, order_id: &str) -> Result<Order, OrderError> {
        self.store
            .get(order_id)?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))
    }

    pub fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        self.store.list(filter)
    }

    pub fn count(&self, filter: &OrderFilter) -> Result<i64, OrderError> {
        self.store.count(filter)
    }

    /// Ratings recorded for an existing order, newest first.
    pub fn ratings_for(&self, order_id: &str) -> Result<Vec<Rating>, OrderError> {
        // distinguish "no ratings" from "no such order"
        self.get(order_id)?;
        self.ledger.list_for(order_id)
    }

    /// Apply `action` to the order now.
    pub fn apply(&self, order_id: &str, action: OrderAction) -> Result<Order, OrderError> {
        self.apply_at(order_id, action, Utc::now())
    }

    /// Apply `action` to the order as of `now`.
    pub fn apply_at(
        &self,
        order_id: &str,
        action: OrderAction,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self
            .locks
            .with_lock(order_id, || self.commit(order_id, &action, now));
        metrics::TRANSITION_DURATION
            .with_label_values(&[action.as_str()])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok((before, transition)) => {
                metrics::ORDER_TRANSITIONS
                    .with_label_values(&[action.as_str(), "ok"])
                    .inc();
                self.stats.invalidate();
                record_outcome(&action, &transition);

                info!(
                    order_id = %order_id,
                    action = action.as_str(),
                    actor = action.actor().unwrap_or("system"),
                    from = %transition.from,
                    to = %transition.to(),
                    version = transition.order.version,
                    "Order transition committed"
                );

                self.emit(audit_events(&before, &action, &transition));
                Ok(transition.order)
            }
            Err(e) => {
                metrics::ORDER_TRANSITIONS
                    .with_label_values(&[action.as_str(), e.kind().as_str()])
                    .inc();
                debug!(
                    order_id = %order_id,
                    action = action.as_str(),
                    actor = action.actor().unwrap_or("system"),
                    "Order action refused: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Reopen every claimed or in-progress order whose claim timed out.
    /// Returns the ids that were released.
    pub fn expire_stale_claims(&self, now: DateTime<Utc>) -> Result<Vec<String>, OrderError> {
        if self.engine.claim_timeout().is_none() {
            return Ok(Vec::new());
        }

        let mut expired = Vec::new();
        for status in [OrderStatus::Claimed, OrderStatus::InProgress] {
            let candidates = self.store.list(&OrderFilter::all().with_status(status))?;
            for order in candidates
                .iter()
                .filter(|o| self.engine.is_claim_stale(o, now))
            {
                // The claimant may have submitted since the scan; the engine
                // re-checks under the lock.
                match self.apply_at(&order.id, OrderAction::Expire, now) {
                    Ok(_) => expired.push(order.id.clone()),
                    Err(e) => warn!(order_id = %order.id, "Skipping claim expiry: {}", e),
                }
            }
        }

        Ok(expired)
    }

    /// Critical section. Returns the order as read and the committed transition.
    fn commit(
        &self,
        order_id: &str,
        action: &OrderAction,
        now: DateTime<Utc>,
    ) -> Result<(Order, Transition), OrderError> {
        let order = self.get(order_id)?;

        let already_rated = match action {
            OrderAction::Rate { rated_by, .. } => {
                self.ledger.has_rated(order_id, rated_by.trim())?
            }
            _ => false,
        };
        let ctx = DecisionContext::at(now).with_already_rated(already_rated);

        let transition = self.engine.decide(&order, action, &ctx)?;

        let stored = match &transition.rating {
            Some(rating) => {
                self.ledger
                    .append(rating, &transition.order, order.version)?;
                self.get(order_id)?
            }
            None => self.store.put(&transition.order, order.version)?,
        };

        Ok((
            order,
            Transition {
                order: stored,
                ..transition
            },
        ))
    }

    fn emit(&self, events: Vec<AuditEvent>) {
        if let Some(ref audit) = self.audit {
            audit.try_emit_all(events);
        }
    }
}

fn record_outcome(action: &OrderAction, transition: &Transition) {
    if let Some(ref rating) = transition.rating {
        metrics::RATINGS_RECORDED
            .with_label_values(&[rating.rating.to_string().as_str()])
            .inc();
    }
    if !transition.changed_status() {
        return;
    }
    match (action, transition.to()) {
        (_, OrderStatus::Completed) => metrics::ORDERS_COMPLETED.inc(),
        (OrderAction::Reject { .. }, OrderStatus::Rejected) => metrics::ORDERS_REJECTED
            .with_label_values(&["requester"])
            .inc(),
        (_, OrderStatus::Rejected) => metrics::ORDERS_REJECTED
            .with_label_values(&["ratings"])
            .inc(),
        (OrderAction::Expire, _) => metrics::CLAIMS_EXPIRED.inc(),
        _ => {}
    }
}

/// Audit trail for a committed transition.
fn audit_events(before: &Order, action: &OrderAction, transition: &Transition) -> Vec<AuditEvent> {
    let after = &transition.order;
    let order_id = after.id.clone();
    let claimant = || {
        before
            .claimed_by()
            .or(after.claimed_by())
            .unwrap_or_default()
            .to_string()
    };

    let mut events = Vec::new();
    match action {
        OrderAction::Claim { .. } => events.push(AuditEvent::OrderClaimed {
            order_id: order_id.clone(),
            claimed_by: claimant(),
        }),
        OrderAction::StartWork { .. } => events.push(AuditEvent::WorkStarted {
            order_id: order_id.clone(),
            started_by: claimant(),
        }),
        OrderAction::Submit { .. } => events.push(AuditEvent::WorkSubmitted {
            order_id: order_id.clone(),
            submitted_by: claimant(),
            delivery_url: after.delivery().map(|d| d.url.clone()).unwrap_or_default(),
        }),
        OrderAction::Rate { .. } => {
            if let Some(ref rating) = transition.rating {
                events.push(AuditEvent::OrderRated {
                    order_id: order_id.clone(),
                    rating_id: rating.id.clone(),
                    rated_by: rating.rated_by.clone(),
                    rating: rating.rating,
                    rating_count: after.ratings.count,
                    average_rating: after.ratings.average(),
                });
            }
        }
        OrderAction::Reject { .. } => {}
        OrderAction::Release { .. } | OrderAction::Expire => {
            events.push(AuditEvent::ClaimReleased {
                order_id: order_id.clone(),
                claimed_by: claimant(),
                expired: matches!(action, OrderAction::Expire),
            })
        }
    }

    if transition.changed_status() {
        match &after.state {
            OrderState::Completed { assignment, .. } => events.push(AuditEvent::OrderCompleted {
                order_id,
                claimed_by: assignment.claimed_by.clone(),
                payment_amount: after.payment_amount,
                rating_count: after.ratings.count,
                average_rating: after.ratings.average(),
            }),
            OrderState::Rejected {
                rejected_by,
                reason,
                ..
            } => events.push(AuditEvent::OrderRejected {
                order_id,
                rejected_by: rejected_by.clone(),
                reason: reason.clone(),
            }),
            _ => {}
        }
    }

    events
}
