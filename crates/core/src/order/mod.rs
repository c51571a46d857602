//! Orders, their lifecycle state and the ratings collected against them.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteOrderStore;
pub use store::{ErrorKind, OrderError, OrderFilter, OrderStore, RatingLedger};
pub use types::{
    Assignment, Delivery, Order, OrderCategory, OrderDraft, OrderState, OrderStatus, Rating,
    RatingAggregate, RatingId,
};
