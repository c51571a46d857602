//! Core order data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Enumerations
// ============================================================================

/// Kind of automation an order asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderCategory {
    WebScraping,
    DataProcessing,
    ApiIntegration,
    WorkflowAutomation,
    EmailAutomation,
    FileProcessing,
    DatabaseAutomation,
    Other,
}

impl OrderCategory {
    pub const ALL: [OrderCategory; 8] = [
        OrderCategory::WebScraping,
        OrderCategory::DataProcessing,
        OrderCategory::ApiIntegration,
        OrderCategory::WorkflowAutomation,
        OrderCategory::EmailAutomation,
        OrderCategory::FileProcessing,
        OrderCategory::DatabaseAutomation,
        OrderCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderCategory::WebScraping => "web_scraping",
            OrderCategory::DataProcessing => "data_processing",
            OrderCategory::ApiIntegration => "api_integration",
            OrderCategory::WorkflowAutomation => "workflow_automation",
            OrderCategory::EmailAutomation => "email_automation",
            OrderCategory::FileProcessing => "file_processing",
            OrderCategory::DatabaseAutomation => "database_automation",
            OrderCategory::Other => "other",
        }
    }
}

impl fmt::Display for OrderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// Flat lifecycle status, as exposed to clients and used for filtering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    Claimed,
    InProgress,
    Submitted,
    Completed,
    Rejected,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Open,
        OrderStatus::Claimed,
        OrderStatus::InProgress,
        OrderStatus::Submitted,
        OrderStatus::Completed,
        OrderStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Claimed => "claimed",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Completed => "completed",
            OrderStatus::Rejected => "rejected",
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Rejected)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown status: {}", s))
    }
}

// ============================================================================
// Lifecycle state
// ============================================================================

/// The developer holding a claim on an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub claimed_by: String,
    pub claimed_at: DateTime<Utc>,
    /// Set when the developer explicitly started work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// A submitted deliverable. Written once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delivery {
    pub url: String,
    pub description: String,
    pub submitted_at: DateTime<Utc>,
}

/// Lifecycle state of an order.
///
/// ```text
/// Open -> Claimed -> (InProgress) -> Submitted -> Completed
///           |            |               |
///           +-----+------+               +-----> Rejected
///                 v
///          Open (released / expired)
/// ```
///
/// Fields only exist in the states where they are meaningful, so an order
/// can never carry a claimant while open or a delivery before submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderState {
    /// Posted, waiting for a developer.
    Open,

    /// Exclusively assigned to a developer.
    Claimed { assignment: Assignment },

    /// Developer announced they started working.
    InProgress { assignment: Assignment },

    /// Deliverable submitted, collecting community ratings.
    Submitted {
        assignment: Assignment,
        delivery: Delivery,
    },

    /// Ratings crossed the quality threshold (terminal). The deliverable is
    /// public and the bounty can be paid out.
    Completed {
        assignment: Assignment,
        delivery: Delivery,
        completed_at: DateTime<Utc>,
    },

    /// Submission was turned down (terminal). Kept for history.
    Rejected {
        assignment: Assignment,
        delivery: Delivery,
        rejected_by: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        rejected_at: DateTime<Utc>,
    },
}

impl OrderState {
    pub fn status(&self) -> OrderStatus {
        match self {
            OrderState::Open => OrderStatus::Open,
            OrderState::Claimed { .. } => OrderStatus::Claimed,
            OrderState::InProgress { .. } => OrderStatus::InProgress,
            OrderState::Submitted { .. } => OrderStatus::Submitted,
            OrderState::Completed { .. } => OrderStatus::Completed,
            OrderState::Rejected { .. } => OrderStatus::Rejected,
        }
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            OrderState::Open => None,
            OrderState::Claimed { assignment }
            | OrderState::InProgress { assignment }
            | OrderState::Submitted { assignment, .. }
            | OrderState::Completed { assignment, .. }
            | OrderState::Rejected { assignment, .. } => Some(assignment),
        }
    }

    pub fn delivery(&self) -> Option<&Delivery> {
        match self {
            OrderState::Submitted { delivery, .. }
            | OrderState::Completed { delivery, .. }
            | OrderState::Rejected { delivery, .. } => Some(delivery),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

// ============================================================================
// Ratings
// ============================================================================

/// Identifier of a rating row.
pub type RatingId = String;

/// One community assessment of a submitted order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub id: RatingId,
    pub order_id: String,
    /// Score in 1..=5.
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub rated_by: String,
    pub created_at: DateTime<Utc>,
}

/// Count and sum of the ratings recorded for one order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RatingAggregate {
    pub count: u32,
    pub total: u32,
}

impl RatingAggregate {
    pub fn new(count: u32, total: u32) -> Self {
        Self { count, total }
    }

    /// Exact mean of all scores, 0.0 when nothing was rated yet.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            f64::from(self.total) / f64::from(self.count)
        }
    }

    /// The aggregate after one more score is appended.
    pub fn with_score(&self, score: u8) -> Self {
        Self {
            count: self.count + 1,
            total: self.total + u32::from(score),
        }
    }

    /// `average >= threshold`, compared without dividing.
    pub fn average_at_least(&self, threshold: f64) -> bool {
        self.count > 0 && f64::from(self.total) >= threshold * f64::from(self.count)
    }
}

// ============================================================================
// Order
// ============================================================================

/// Input for creating an order. Validated by the lifecycle engine.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub title: String,
    pub description: String,
    pub category: OrderCategory,
    pub payment_amount: Decimal,
    pub requirements: Vec<String>,
    pub created_by: String,
}

impl OrderDraft {
    /// Strip surrounding whitespace from every text field.
    pub fn trimmed(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            requirements: self
                .requirements
                .iter()
                .map(|r| r.trim().to_string())
                .collect(),
            created_by: self.created_by.trim().to_string(),
            ..self
        }
    }
}

/// A posted automation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Unique identifier (UUID).
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: OrderCategory,
    /// Bounty, fixed at creation.
    pub payment_amount: Decimal,
    pub requirements: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,

    /// Current lifecycle state.
    pub state: OrderState,

    /// Derived from the rating ledger on every read; never written.
    #[serde(default)]
    pub ratings: RatingAggregate,

    /// Bumped on every committed write.
    pub version: u64,

    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn status(&self) -> OrderStatus {
        self.state.status()
    }

    pub fn claimed_by(&self) -> Option<&str> {
        self.state.assignment().map(|a| a.claimed_by.as_str())
    }

    pub fn delivery(&self) -> Option<&Delivery> {
        self.state.delivery()
    }

    /// The deliverable is visible to everyone once the order completed.
    pub fn deliverable_public(&self) -> bool {
        self.status() == OrderStatus::Completed
    }

    /// The bounty may be paid out to the developer.
    pub fn payment_releasable(&self) -> bool {
        self.status() == OrderStatus::Completed
    }
}
