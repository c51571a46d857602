//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Order lifecycle (transitions, creations, completions)
//! - Claim expiry sweeper
//! - Audit log delivery

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Order Lifecycle Metrics
// =============================================================================

/// Lifecycle actions by action and outcome.
pub static ORDER_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bountyboard_order_transitions_total",
            "Total lifecycle actions applied to orders",
        ),
        // action: "claim", "start", "submit", "rate", "reject", "release", "expire"
        // result: "ok" or an error kind such as "invalid_transition"
        &["action", "result"],
    )
    .unwrap()
});

/// Time spent inside the per-order critical section.
pub static TRANSITION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bountyboard_transition_duration_seconds",
            "Duration of order transitions including the storage commit",
        )
        .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5]),
        &["action"],
    )
    .unwrap()
});

/// Orders posted.
pub static ORDERS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("bountyboard_orders_created_total", "Total orders posted").unwrap()
});

/// Orders that reached `completed`.
pub static ORDERS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "bountyboard_orders_completed_total",
        "Total orders completed by community rating",
    )
    .unwrap()
});

/// Orders that reached `rejected`, by who rejected them.
pub static ORDERS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bountyboard_orders_rejected_total", "Total rejected submissions"),
        &["by"], // "requester", "ratings"
    )
    .unwrap()
});

/// Ratings recorded, by score.
pub static RATINGS_RECORDED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bountyboard_ratings_total", "Total ratings recorded"),
        &["score"],
    )
    .unwrap()
});

// =============================================================================
// Claim Sweeper Metrics
// =============================================================================

/// Claims released by the sweeper after timing out.
pub static CLAIMS_EXPIRED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "bountyboard_claims_expired_total",
        "Total claims released after the claim timeout",
    )
    .unwrap()
});

/// Sweeper passes by result.
pub static SWEEPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bountyboard_claim_sweeps_total", "Total claim sweeper passes"),
        &["result"], // "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Audit Metrics
// =============================================================================

/// Audit events that could not be queued.
pub static AUDIT_EVENTS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "bountyboard_audit_events_dropped_total",
        "Total audit events dropped because the channel was full or closed",
    )
    .unwrap()
});

/// Audit events handed to the store, by outcome.
pub static AUDIT_EVENTS_WRITTEN: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bountyboard_audit_events_written_total",
            "Audit events the writer handed to the store",
        ),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Lifecycle
        Box::new(ORDER_TRANSITIONS.clone()),
        Box::new(TRANSITION_DURATION.clone()),
        Box::new(ORDERS_CREATED.clone()),
        Box::new(ORDERS_COMPLETED.clone()),
        Box::new(ORDERS_REJECTED.clone()),
        Box::new(RATINGS_RECORDED.clone()),
        // Sweeper
        Box::new(CLAIMS_EXPIRED.clone()),
        Box::new(SWEEPS.clone()),
        // Audit
        Box::new(AUDIT_EVENTS_DROPPED.clone()),
        Box::new(AUDIT_EVENTS_WRITTEN.clone()),
    ]
}
