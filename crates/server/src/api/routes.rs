use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{audit, handlers, middleware::metrics_middleware, orders, stats};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        // Orders
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/claim", post(orders::claim_order))
        .route("/orders/{id}/start", post(orders::start_work))
        .route("/orders/{id}/submit", post(orders::submit_work))
        .route("/orders/{id}/rate", post(orders::rate_order))
        .route("/orders/{id}/reject", post(orders::reject_order))
        .route("/orders/{id}/release", post(orders::release_claim))
        .route("/orders/{id}/ratings", get(orders::list_ratings))
        // Marketplace stats
        .route("/stats", get(stats::get_stats))
        // Audit
        .route("/audit", get(audit::query_audit))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
