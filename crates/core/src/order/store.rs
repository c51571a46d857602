//! Storage traits for orders and ratings.

use thiserror::Error;

use crate::order::{Order, OrderCategory, OrderDraft, OrderStatus, Rating, RatingAggregate, RatingId};

/// Error type for order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order not found.
    #[error("Order not found: {0}")]
    NotFound(String),

    /// Malformed or out-of-range input.
    #[error("{0}")]
    Validation(String),

    /// Action is not legal for the order's current status.
    #[error("Cannot {action} order {order_id} (status: {status}): {reason}")]
    InvalidTransition {
        order_id: String,
        status: OrderStatus,
        action: &'static str,
        reason: String,
    },

    /// Another writer changed the order since it was read.
    #[error("Order {0} was modified concurrently; refresh and retry")]
    Conflict(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Coarse classification of [`OrderError`], used for HTTP mapping and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ValidationFailed,
    InvalidTransition,
    Conflict,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage",
        }
    }
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NotFound(_) => ErrorKind::NotFound,
            OrderError::Validation(_) => ErrorKind::ValidationFailed,
            OrderError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            OrderError::Conflict(_) => ErrorKind::Conflict,
            OrderError::Database(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn database(e: impl std::fmt::Display) -> Self {
        OrderError::Database(e.to_string())
    }
}

/// Filter for querying orders.
#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub category: Option<OrderCategory>,
    pub created_by: Option<String>,
    pub claimed_by: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            status: None,
            category: None,
            created_by: None,
            claimed_by: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Matches every order, no pagination.
    pub fn all() -> Self {
        Self::new().with_limit(-1)
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_category(mut self, category: OrderCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn with_claimed_by(mut self, claimed_by: impl Into<String>) -> Self {
        self.claimed_by = Some(claimed_by.into());
        self
    }

    /// Set limit. Negative means unlimited.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Durable keyed collection of orders.
///
/// Writes are full-record replacements guarded by the version the caller
/// read; there are no partial-field updates.
pub trait OrderStore: Send + Sync {
    /// Insert a new open order, assigning its id and timestamps.
    fn create(&self, draft: OrderDraft) -> Result<Order, OrderError>;

    /// Get an order by ID, with its rating aggregate.
    fn get(&self, id: &str) -> Result<Option<Order>, OrderError>;

    /// List orders matching the filter, newest first.
    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError>;

    /// Count orders matching the filter (pagination ignored).
    fn count(&self, filter: &OrderFilter) -> Result<i64, OrderError>;

    /// Replace the stored order if its version still equals `expected_version`.
    /// Returns the stored order with the bumped version.
    fn put(&self, order: &Order, expected_version: u64) -> Result<Order, OrderError>;
}

/// Append-only collection of ratings keyed by order id.
pub trait RatingLedger: Send + Sync {
    /// Append a rating and write back the order snapshot it produced, as one
    /// transaction. Fails with `Conflict` if the order's version moved and
    /// with `Validation` if the rater already rated this order.
    fn append(
        &self,
        rating: &Rating,
        order: &Order,
        expected_version: u64,
    ) -> Result<RatingId, OrderError>;

    /// All ratings for an order, newest first.
    fn list_for(&self, order_id: &str) -> Result<Vec<Rating>, OrderError>;

    /// Count and sum of the ratings for an order.
    fn aggregate_for(&self, order_id: &str) -> Result<RatingAggregate, OrderError>;

    /// Whether `rated_by` already rated the order.
    fn has_rated(&self, order_id: &str, rated_by: &str) -> Result<bool, OrderError>;
}
