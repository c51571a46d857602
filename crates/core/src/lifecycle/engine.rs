//! Order lifecycle decisions.
//!
//! The engine is pure: given an order snapshot, an action and the current
//! time it either returns the order as it must be written back, or explains
//! why the action is refused. It never touches storage.

use chrono::Duration;
use rust_decimal::Decimal;

use crate::config::LifecycleConfig;
use crate::order::{
    Assignment, Delivery, Order, OrderDraft, OrderError, OrderState, OrderStatus, Rating,
};

use super::types::{DecisionContext, OrderAction, Transition};

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 10_000;

/// Identity recorded as `rejected_by` when ratings reject a submission.
pub const SYSTEM_ACTOR: &str = "system";

/// Applies the marketplace rules to orders.
#[derive(Debug, Clone)]
pub struct LifecycleEngine {
    config: LifecycleConfig,
    claim_timeout: Option<Duration>,
}

impl LifecycleEngine {
    pub fn new(config: LifecycleConfig, claim_timeout: Option<Duration>) -> Self {
        Self {
            config,
            claim_timeout,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn claim_timeout(&self) -> Option<Duration> {
        self.claim_timeout
    }

    /// Check a new order before it is stored.
    pub fn validate_draft(&self, draft: &OrderDraft) -> Result<(), OrderError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(validation("Title cannot be empty"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(validation(format!(
                "Title cannot exceed {} characters",
                MAX_TITLE_CHARS
            )));
        }

        let description = draft.description.trim();
        if description.is_empty() {
            return Err(validation("Description cannot be empty"));
        }
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(validation(format!(
                "Description cannot exceed {} characters",
                MAX_DESCRIPTION_CHARS
            )));
        }

        if draft.payment_amount <= Decimal::ZERO {
            return Err(validation(format!(
                "Payment amount must be positive, got {}",
                draft.payment_amount
            )));
        }

        if draft.created_by.trim().is_empty() {
            return Err(validation("created_by cannot be empty"));
        }

        if let Some(idx) = draft.requirements.iter().position(|r| r.trim().is_empty()) {
            return Err(validation(format!("Requirement {} is empty", idx + 1)));
        }

        Ok(())
    }

    /// Whether the order's claim has outlived the configured timeout at `now`.
    pub fn is_claim_stale(&self, order: &Order, now: chrono::DateTime<chrono::Utc>) -> bool {
        let Some(timeout) = self.claim_timeout else {
            return false;
        };
        match &order.state {
            OrderState::Claimed { assignment } | OrderState::InProgress { assignment } => {
                assignment
                    .claimed_at
                    .checked_add_signed(timeout)
                    .is_some_and(|deadline| deadline <= now)
            }
            _ => false,
        }
    }

    /// Decide the outcome of `action` against `order`.
    pub fn decide(
        &self,
        order: &Order,
        action: &OrderAction,
        ctx: &DecisionContext,
    ) -> Result<Transition, OrderError> {
        let from = order.status();
        let mut next = order.clone();
        let mut rating = None;

        next.state = match action {
            OrderAction::Claim { claimed_by } => self.claim(order, action, claimed_by, ctx)?,
            OrderAction::StartWork { started_by } => start_work(order, action, started_by, ctx)?,
            OrderAction::Submit {
                delivery_url,
                delivery_description,
                submitted_by,
            } => self.submit(
                order,
                action,
                delivery_url,
                delivery_description,
                submitted_by.as_deref(),
                ctx,
            )?,
            OrderAction::Rate {
                rating: score,
                comment,
                rated_by,
            } => {
                let (state, appended) =
                    self.rate(order, action, *score, comment.as_deref(), rated_by, ctx)?;
                next.ratings = order.ratings.with_score(appended.rating);
                rating = Some(appended);
                state
            }
            OrderAction::Reject {
                rejected_by,
                reason,
            } => reject(order, action, rejected_by, reason.as_deref(), ctx)?,
            OrderAction::Release { released_by } => release(order, action, released_by)?,
            OrderAction::Expire => self.expire(order, action, ctx)?,
        };

        Ok(Transition {
            order: next,
            rating,
            from,
        })
    }

    fn claim(
        &self,
        order: &Order,
        action: &OrderAction,
        claimed_by: &str,
        ctx: &DecisionContext,
    ) -> Result<OrderState, OrderError> {
        let claimed_by = claimed_by.trim();
        if claimed_by.is_empty() {
            return Err(validation("claimed_by cannot be empty"));
        }
        if order.status() != OrderStatus::Open {
            return Err(refuse(order, action, "order is not available for claiming"));
        }
        if !self.config.allow_self_claim && claimed_by == order.created_by {
            return Err(refuse(order, action, "requesters cannot claim their own order"));
        }

        Ok(OrderState::Claimed {
            assignment: Assignment {
                claimed_by: claimed_by.to_string(),
                claimed_at: ctx.now,
                started_at: None,
            },
        })
    }

    fn submit(
        &self,
        order: &Order,
        action: &OrderAction,
        delivery_url: &str,
        delivery_description: &str,
        submitted_by: Option<&str>,
        ctx: &DecisionContext,
    ) -> Result<OrderState, OrderError> {
        let url = delivery_url.trim();
        if url.is_empty() {
            return Err(validation("delivery_url cannot be empty"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(validation(format!(
                "delivery_url must be an http(s) URL, got {}",
                url
            )));
        }
        let description = delivery_description.trim();
        if description.is_empty() {
            return Err(validation("delivery_description cannot be empty"));
        }

        let assignment = match &order.state {
            OrderState::Claimed { assignment } | OrderState::InProgress { assignment } => {
                assignment
            }
            _ => return Err(refuse(order, action, "order has not been claimed")),
        };

        match submitted_by.map(str::trim) {
            Some(who) if who != assignment.claimed_by => {
                return Err(refuse(
                    order,
                    action,
                    format!("only the claimant ({}) can submit", assignment.claimed_by),
                ));
            }
            None if self.config.enforce_submitter_identity => {
                return Err(validation("submitted_by is required"));
            }
            _ => {}
        }

        Ok(OrderState::Submitted {
            assignment: assignment.clone(),
            delivery: Delivery {
                url: url.to_string(),
                description: description.to_string(),
                submitted_at: ctx.now,
            },
        })
    }

    fn rate(
        &self,
        order: &Order,
        action: &OrderAction,
        score: i64,
        comment: Option<&str>,
        rated_by: &str,
        ctx: &DecisionContext,
    ) -> Result<(OrderState, Rating), OrderError> {
        let score = u8::try_from(score)
            .ok()
            .filter(|s| (1..=5).contains(s))
            .ok_or_else(|| validation(format!("Rating must be between 1 and 5, got {}", score)))?;
        let rated_by = rated_by.trim();
        if rated_by.is_empty() {
            return Err(validation("rated_by cannot be empty"));
        }

        let OrderState::Submitted {
            assignment,
            delivery,
        } = &order.state
        else {
            return Err(refuse(order, action, "only submitted orders can be rated"));
        };

        if rated_by == assignment.claimed_by {
            return Err(validation("Developers cannot rate their own delivery"));
        }
        if ctx.already_rated {
            return Err(validation("You have already rated this order"));
        }

        let rating = Rating {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            rating: score,
            comment: comment
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            rated_by: rated_by.to_string(),
            created_at: ctx.now,
        };

        let aggregate = order.ratings.with_score(score);
        let cfg = &self.config;

        let state = if aggregate.count >= cfg.completion_min_ratings
            && aggregate.average_at_least(cfg.completion_min_average)
        {
            OrderState::Completed {
                assignment: assignment.clone(),
                delivery: delivery.clone(),
                completed_at: ctx.now,
            }
        } else if cfg
            .auto_reject_min_ratings
            .is_some_and(|min| aggregate.count >= min)
            && !aggregate.average_at_least(cfg.auto_reject_below_average)
        {
            OrderState::Rejected {
                assignment: assignment.clone(),
                delivery: delivery.clone(),
                rejected_by: SYSTEM_ACTOR.to_string(),
                reason: Some(format!(
                    "average rating {:.2} over {} ratings is below {}",
                    aggregate.average(),
                    aggregate.count,
                    cfg.auto_reject_below_average
                )),
                rejected_at: ctx.now,
            }
        } else {
            order.state.clone()
        };

        Ok((state, rating))
    }

    fn expire(
        &self,
        order: &Order,
        action: &OrderAction,
        ctx: &DecisionContext,
    ) -> Result<OrderState, OrderError> {
        if !matches!(
            order.state,
            OrderState::Claimed { .. } | OrderState::InProgress { .. }
        ) {
            return Err(refuse(order, action, "order has no active claim"));
        }
        if !self.is_claim_stale(order, ctx.now) {
            return Err(refuse(order, action, "claim has not expired"));
        }
        Ok(OrderState::Open)
    }
}

fn start_work(
    order: &Order,
    action: &OrderAction,
    started_by: &str,
    ctx: &DecisionContext,
) -> Result<OrderState, OrderError> {
    let OrderState::Claimed { assignment } = &order.state else {
        return Err(refuse(order, action, "work can only start on a claimed order"));
    };
    if started_by.trim() != assignment.claimed_by {
        return Err(refuse(
            order,
            action,
            format!("only the claimant ({}) can start work", assignment.claimed_by),
        ));
    }

    Ok(OrderState::InProgress {
        assignment: Assignment {
            started_at: Some(ctx.now),
            ..assignment.clone()
        },
    })
}

fn reject(
    order: &Order,
    action: &OrderAction,
    rejected_by: &str,
    reason: Option<&str>,
    ctx: &DecisionContext,
) -> Result<OrderState, OrderError> {
    let OrderState::Submitted {
        assignment,
        delivery,
    } = &order.state
    else {
        return Err(refuse(order, action, "only submitted orders can be rejected"));
    };
    let rejected_by = rejected_by.trim();
    if rejected_by != order.created_by {
        return Err(refuse(order, action, "only the requester can reject a submission"));
    }

    Ok(OrderState::Rejected {
        assignment: assignment.clone(),
        delivery: delivery.clone(),
        rejected_by: rejected_by.to_string(),
        reason: reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
        rejected_at: ctx.now,
    })
}

fn release(
    order: &Order,
    action: &OrderAction,
    released_by: &str,
) -> Result<OrderState, OrderError> {
    let assignment = match &order.state {
        OrderState::Claimed { assignment } | OrderState::InProgress { assignment } => assignment,
        _ => return Err(refuse(order, action, "order has no active claim")),
    };
    if released_by.trim() != assignment.claimed_by {
        return Err(refuse(
            order,
            action,
            format!("only the claimant ({}) can release", assignment.claimed_by),
        ));
    }
    Ok(OrderState::Open)
}

fn validation(msg: impl Into<String>) -> OrderError {
    OrderError::Validation(msg.into())
}

fn refuse(order: &Order, action: &OrderAction, reason: impl Into<String>) -> OrderError {
    OrderError::InvalidTransition {
        order_id: order.id.clone(),
        status: order.status(),
        action: action.as_str(),
        reason: reason.into(),
    }
}
