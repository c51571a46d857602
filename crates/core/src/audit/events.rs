use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::OrderCategory;

/// Audit event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Order lifecycle
    OrderCreated {
        order_id: String,
        created_by: String,
        title: String,
        category: OrderCategory,
        payment_amount: Decimal,
    },
    OrderClaimed {
        order_id: String,
        claimed_by: String,
    },
    WorkStarted {
        order_id: String,
        started_by: String,
    },
    WorkSubmitted {
        order_id: String,
        /// The claimant the delivery is attributed to
        submitted_by: String,
        delivery_url: String,
    },
    OrderRated {
        order_id: String,
        rating_id: String,
        rated_by: String,
        rating: u8,
        /// Aggregate after this rating was appended
        rating_count: u32,
        average_rating: f64,
    },
    /// Ratings crossed the completion threshold; the bounty is releasable.
    OrderCompleted {
        order_id: String,
        claimed_by: String,
        payment_amount: Decimal,
        rating_count: u32,
        average_rating: f64,
    },
    OrderRejected {
        order_id: String,
        rejected_by: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// A claim was dropped and the order reopened.
    ClaimReleased {
        order_id: String,
        claimed_by: String,
        /// True when the sweeper released it after the claim timeout
        expired: bool,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::OrderCreated { .. } => "order_created",
            Self::OrderClaimed { .. } => "order_claimed",
            Self::WorkStarted { .. } => "work_started",
            Self::WorkSubmitted { .. } => "work_submitted",
            Self::OrderRated { .. } => "order_rated",
            Self::OrderCompleted { .. } => "order_completed",
            Self::OrderRejected { .. } => "order_rejected",
            Self::ClaimReleased { .. } => "claim_released",
        }
    }

    /// Returns the order ID if this event is associated with an order
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::OrderCreated { order_id, .. }
            | Self::OrderClaimed { order_id, .. }
            | Self::WorkStarted { order_id, .. }
            | Self::WorkSubmitted { order_id, .. }
            | Self::OrderRated { order_id, .. }
            | Self::OrderCompleted { order_id, .. }
            | Self::OrderRejected { order_id, .. }
            | Self::ClaimReleased { order_id, .. } => Some(order_id),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }

    /// Returns the identity that caused this event, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::OrderCreated { created_by, .. } => Some(created_by),
            Self::OrderClaimed { claimed_by, .. } => Some(claimed_by),
            Self::WorkStarted { started_by, .. } => Some(started_by),
            Self::WorkSubmitted { submitted_by, .. } => Some(submitted_by),
            Self::OrderRated { rated_by, .. } => Some(rated_by),
            Self::OrderRejected { rejected_by, .. } => Some(rejected_by),
            Self::ClaimReleased {
                claimed_by,
                expired: false,
                ..
            } => Some(claimed_by),
            Self::ClaimReleased { expired: true, .. }
            | Self::OrderCompleted { .. }
            | Self::ServiceStarted { .. }
            | Self::ServiceStopped { .. } => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub order_id: Option<String>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}
