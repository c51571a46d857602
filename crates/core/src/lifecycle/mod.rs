//! Order lifecycle rules.

mod engine;
mod types;

pub use engine::{LifecycleEngine, SYSTEM_ACTOR};
pub use types::{DecisionContext, OrderAction, Transition};
