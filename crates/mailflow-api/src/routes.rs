//! API routes

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{events, health, rules, stats};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness));

    let rule_routes = Router::new()
        .route("/", get(rules::list_rules))
        .route("/", post(rules::create_rule))
        .route("/:rule_id", get(rules::get_rule))
        .route("/:rule_id", put(rules::update_rule))
        .route("/:rule_id", delete(rules::delete_rule))
        .route("/:rule_id/enable", post(rules::enable_rule))
        .route("/:rule_id/disable", post(rules::disable_rule))
        .route("/:rule_id/reactivate", post(rules::reactivate_rule))
        .route("/:rule_id/deprecate", post(rules::deprecate_rule))
        .route("/:rule_id/test", post(rules::test_rule))
        .route("/:rule_id/executions", get(rules::list_rule_executions))
        .route("/:rule_id/cooldowns/reset", post(rules::reset_cooldown));

    let event_routes = Router::new()
        .route("/", post(events::submit_event))
        .route("/recent", get(events::list_recent_executions));

    let api_v1 = Router::new()
        .nest("/rules", rule_routes)
        .nest("/events", event_routes)
        .route("/stats", get(stats::get_stats));

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
