//! Order API handlers.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use bountyboard_core::{
    Order, OrderAction, OrderCategory, OrderDraft, OrderFilter, OrderState, OrderStatus, Rating,
};

use super::error::ApiError;
use crate::state::AppState;

/// Maximum allowed limit for order queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for order queries
const DEFAULT_LIMIT: i64 = 1000;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for posting an order
#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    pub title: String,
    pub description: String,
    pub category: OrderCategory,
    /// Accepted as a JSON number or a decimal string
    pub payment_amount: Decimal,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub created_by: String,
}

/// Query parameters for listing orders
#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub status: Option<OrderStatus>,
    pub category: Option<OrderCategory>,
    pub created_by: Option<String>,
    pub claimed_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimBody {
    pub claimed_by: String,
}

#[derive(Debug, Deserialize)]
pub struct StartBody {
    pub started_by: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub delivery_url: String,
    pub delivery_description: String,
    pub submitted_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RateBody {
    /// Range-checked by the lifecycle engine, not by deserialization.
    pub rating: i64,
    pub comment: Option<String>,
    pub rated_by: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub rejected_by: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
    pub released_by: String,
}

/// Flat view of an order as clients see it.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: OrderCategory,
    #[serde(with = "rust_decimal::serde::float")]
    pub payment_amount: Decimal,
    pub requirements: Vec<String>,
    pub created_by: String,
    pub created_at: String,
    pub status: OrderStatus,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<String>,
    pub started_at: Option<String>,
    pub delivery_url: Option<String>,
    pub delivery_description: Option<String>,
    pub submitted_at: Option<String>,
    pub completed_at: Option<String>,
    pub rejected_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<String>,
    pub average_rating: f64,
    pub rating_count: u32,
    pub deliverable_public: bool,
    pub payment_releasable: bool,
    pub version: u64,
    pub updated_at: String,
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let status = order.status();
        let deliverable_public = order.deliverable_public();
        let payment_releasable = order.payment_releasable();

        let mut response = Self {
            id: order.id,
            title: order.title,
            description: order.description,
            category: order.category,
            payment_amount: order.payment_amount,
            requirements: order.requirements,
            created_by: order.created_by,
            created_at: rfc3339(&order.created_at),
            status,
            claimed_by: None,
            claimed_at: None,
            started_at: None,
            delivery_url: None,
            delivery_description: None,
            submitted_at: None,
            completed_at: None,
            rejected_by: None,
            rejection_reason: None,
            rejected_at: None,
            average_rating: order.ratings.average(),
            rating_count: order.ratings.count,
            deliverable_public,
            payment_releasable,
            version: order.version,
            updated_at: rfc3339(&order.updated_at),
        };

        if let Some(assignment) = order.state.assignment() {
            response.claimed_by = Some(assignment.claimed_by.clone());
            response.claimed_at = Some(rfc3339(&assignment.claimed_at));
            response.started_at = assignment.started_at.as_ref().map(rfc3339);
        }
        if let Some(delivery) = order.state.delivery() {
            response.delivery_url = Some(delivery.url.clone());
            response.delivery_description = Some(delivery.description.clone());
            response.submitted_at = Some(rfc3339(&delivery.submitted_at));
        }
        match order.state {
            OrderState::Completed { completed_at, .. } => {
                response.completed_at = Some(rfc3339(&completed_at));
            }
            OrderState::Rejected {
                rejected_by,
                reason,
                rejected_at,
                ..
            } => {
                response.rejected_by = Some(rejected_by);
                response.rejection_reason = reason;
                response.rejected_at = Some(rfc3339(&rejected_at));
            }
            _ => {}
        }

        response
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List orders, newest first
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListOrdersParams>, QueryRejection>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let Query(params) = params?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = OrderFilter::new().with_limit(limit).with_offset(offset);
    if let Some(status) = params.status {
        filter = filter.with_status(status);
    }
    if let Some(category) = params.category {
        filter = filter.with_category(category);
    }
    if let Some(created_by) = params.created_by {
        filter = filter.with_created_by(created_by);
    }
    if let Some(claimed_by) = params.claimed_by {
        filter = filter.with_claimed_by(claimed_by);
    }

    let orders = state.coordinator().list(&filter)?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// Post a new order
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateOrderBody>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(body) = payload?;

    let order = state.coordinator().create(OrderDraft {
        title: body.title,
        description: body.description,
        category: body.category,
        payment_amount: body.payment_amount,
        requirements: body.requirements,
        created_by: body.created_by,
    })?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
}

/// Get one order by ID
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.coordinator().get(&id)?;
    Ok(Json(order.into()))
}

/// Ratings recorded for an order, newest first
pub async fn list_ratings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Rating>>, ApiError> {
    Ok(Json(state.coordinator().ratings_for(&id)?))
}

fn apply(state: &AppState, id: &str, action: OrderAction) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.coordinator().apply(id, action)?;
    Ok(Json(order.into()))
}

pub async fn claim_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ClaimBody>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(body) = payload?;
    apply(
        &state,
        &id,
        OrderAction::Claim {
            claimed_by: body.claimed_by,
        },
    )
}

pub async fn start_work(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<StartBody>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(body) = payload?;
    apply(
        &state,
        &id,
        OrderAction::StartWork {
            started_by: body.started_by,
        },
    )
}

pub async fn submit_work(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(body) = payload?;
    apply(
        &state,
        &id,
        OrderAction::Submit {
            delivery_url: body.delivery_url,
            delivery_description: body.delivery_description,
            submitted_by: body.submitted_by,
        },
    )
}

/// Rate a submission. The returned order may already be completed or rejected.
pub async fn rate_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<RateBody>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(body) = payload?;
    apply(
        &state,
        &id,
        OrderAction::Rate {
            rating: body.rating,
            comment: body.comment,
            rated_by: body.rated_by,
        },
    )
}

pub async fn reject_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<RejectBody>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(body) = payload?;
    apply(
        &state,
        &id,
        OrderAction::Reject {
            rejected_by: body.rejected_by,
            reason: body.reason,
        },
    )
}

pub async fn release_claim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ReleaseBody>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(body) = payload?;
    apply(
        &state,
        &id,
        OrderAction::Release {
            released_by: body.released_by,
        },
    )
}
