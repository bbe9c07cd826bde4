//! Engine statistics handler

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;

use mailflow_engine::EngineStats;

use super::error_status;
use crate::state::AppState;

/// Current engine statistics: lifetime outcome totals, the 24-hour
/// delivery success rate, per-rule activity, and rule status counts
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EngineStats>, StatusCode> {
    let counts = state
        .engine
        .store()
        .repo()
        .counts()
        .await
        .map_err(error_status)?;
    let stats = state.engine.stats().snapshot(counts, Utc::now()).await;
    Ok(Json(stats))
}
