use std::sync::Arc;
use bountyboard_core::{AuditStore, Config, OrderCoordinator};

/// Shared application state
pub struct AppState {
    config: Config,
    coordinator: Arc<OrderCoordinator>,
    audit_store: Arc<dyn AuditStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        coordinator: Arc<OrderCoordinator>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            config,
            coordinator,
            audit_store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &OrderCoordinator {
        self.coordinator.as_ref()
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }
}
