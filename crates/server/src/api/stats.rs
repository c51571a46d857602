use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use bountyboard_core::MarketStats;

use super::error::ApiError;
use crate::state::AppState;

/// Marketplace totals
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_orders: u64,
    pub open_orders: u64,
    pub completed_orders: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
}

impl From<MarketStats> for StatsResponse {
    fn from(stats: MarketStats) -> Self {
        Self {
            total_orders: stats.total_orders,
            open_orders: stats.open_orders,
            completed_orders: stats.completed_orders,
            total_value: stats.total_value,
        }
    }
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.coordinator().stats().snapshot()?;
    Ok(Json(stats.into()))
}
