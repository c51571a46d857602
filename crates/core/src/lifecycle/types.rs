//! Actions and decision results for the lifecycle engine.

use chrono::{DateTime, Utc};

use crate::order::{Order, OrderStatus, Rating};

/// A mutating request against one order.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderAction {
    /// Developer takes exclusive ownership of an open order.
    Claim { claimed_by: String },

    /// Claimant announces that work has begun.
    StartWork { started_by: String },

    /// Claimant hands in the deliverable.
    Submit {
        delivery_url: String,
        delivery_description: String,
        submitted_by: Option<String>,
    },

    /// Community member scores a submitted deliverable.
    ///
    /// The score is kept wide so out-of-range input reaches validation
    /// instead of failing at deserialization.
    Rate {
        rating: i64,
        comment: Option<String>,
        rated_by: String,
    },

    /// Requester turns down the submission.
    Reject {
        rejected_by: String,
        reason: Option<String>,
    },

    /// Claimant gives the order back.
    Release { released_by: String },

    /// Claim ran past its timeout (issued by the sweeper).
    Expire,
}

impl OrderAction {
    /// Short verb used in errors, logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Claim { .. } => "claim",
            OrderAction::StartWork { .. } => "start",
            OrderAction::Submit { .. } => "submit",
            OrderAction::Rate { .. } => "rate",
            OrderAction::Reject { .. } => "reject",
            OrderAction::Release { .. } => "release",
            OrderAction::Expire => "expire",
        }
    }

    /// The identity performing the action, if any.
    pub fn actor(&self) -> Option<&str> {
        match self {
            OrderAction::Claim { claimed_by } => Some(claimed_by),
            OrderAction::StartWork { started_by } => Some(started_by),
            OrderAction::Submit { submitted_by, .. } => submitted_by.as_deref(),
            OrderAction::Rate { rated_by, .. } => Some(rated_by),
            OrderAction::Reject { rejected_by, .. } => Some(rejected_by),
            OrderAction::Release { released_by } => Some(released_by),
            OrderAction::Expire => None,
        }
    }
}

/// Facts the engine needs that are not part of the order itself.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub now: DateTime<Utc>,
    /// Whether the rater of a `Rate` action already has a rating on file.
    pub already_rated: bool,
}

impl DecisionContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            already_rated: false,
        }
    }

    pub fn with_already_rated(mut self, already_rated: bool) -> Self {
        self.already_rated = already_rated;
        self
    }
}

/// Outcome of an accepted action.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Order as it must be written back.
    pub order: Order,
    /// Rating to append together with the order write, for `Rate`.
    pub rating: Option<Rating>,
    /// Status before the action.
    pub from: OrderStatus,
}

impl Transition {
    /// Status after the action.
    pub fn to(&self) -> OrderStatus {
        self.order.status()
    }

    pub fn changed_status(&self) -> bool {
        self.from != self.to()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names() {
        let action = OrderAction::Rate {
            rating: 5,
            comment: None,
            rated_by: "r1".to_string(),
        };
        assert_eq!(action.as_str(), "rate");
        assert_eq!(action.actor(), Some("r1"));
        assert_eq!(OrderAction::Expire.actor(), None);

        let submit = OrderAction::Submit {
            delivery_url: "https://x".to_string(),
            delivery_description: "d".to_string(),
            submitted_by: None,
        };
        assert_eq!(submit.actor(), None);
    }
}
