//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::state::AppState;

/// Basic health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Basic health check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Liveness check (is the process running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness check (can the service serve requests)
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = pool.health_check().await {
            error!("Readiness check failed: {}", e);
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }
    StatusCode::OK
}
