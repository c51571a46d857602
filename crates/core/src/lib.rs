pub mod audit;
pub mod config;
pub mod coordinator;
pub mod lifecycle;
pub mod metrics;
pub mod order;
pub mod stats;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, AuditWriter, SqliteAuditStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuditConfig, ClaimsConfig, Config,
    ConfigError, DatabaseConfig, LifecycleConfig, ServerConfig,
};
pub use coordinator::{ClaimSweeper, OrderCoordinator};
pub use lifecycle::{DecisionContext, LifecycleEngine, OrderAction, Transition};
pub use order::{
    Assignment, Delivery, ErrorKind, Order, OrderCategory, OrderDraft, OrderError, OrderFilter,
    OrderState, OrderStatus, OrderStore, Rating, RatingAggregate, RatingLedger, SqliteOrderStore,
};
pub use stats::{MarketStats, StatsAggregator};
