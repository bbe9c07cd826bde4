//! Rule management handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use mailflow_common::types::{ActionConfig, EmailAddress, RuleConditions, RuleKind, RuleStatus};
use mailflow_common::Error;
use mailflow_engine::TestExecution;
use mailflow_storage::models::{CreateRule, ExecutionRecord, Rule};

use super::error_status;
use crate::handlers::events::EventRequest;
use crate::state::AppState;

/// Request body for creating or replacing a rule
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub description: Option<String>,
    pub kind: String,
    pub priority: Option<i32>,
    #[serde(default)]
    pub conditions: RuleConditions,
    #[serde(default)]
    pub action_config: ActionConfig,
}

impl CreateRuleRequest {
    /// Validate the request and convert it to a storage input.
    /// Malformed configuration is rejected here, at write time, so the
    /// engine never loads a rule it cannot execute.
    fn into_create(self) -> Result<CreateRule, Error> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("name must be non-empty".to_string()));
        }
        let kind = RuleKind::parse(&self.kind)
            .ok_or_else(|| Error::Validation(format!("Unknown rule kind: {:?}", self.kind)))?;
        self.conditions.validate()?;
        self.action_config.validate(kind)?;
        Ok(CreateRule {
            name: self.name,
            description: self.description,
            kind,
            priority: self.priority.unwrap_or(0),
            conditions: self.conditions,
            action_config: self.action_config,
        })
    }
}

/// List all rules
pub async fn list_rules(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Rule>>, StatusCode> {
    let rules = state
        .engine
        .store()
        .repo()
        .list()
        .await
        .map_err(error_status)?;
    Ok(Json(rules))
}

/// Create a rule (created in DRAFT status)
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<Rule>), StatusCode> {
    let create = input.into_create().map_err(error_status)?;
    let rule = state
        .engine
        .store()
        .repo()
        .create(create)
        .await
        .map_err(error_status)?;

    info!(rule_id = %rule.id, name = %rule.name, "rule created");
    Ok((StatusCode::CREATED, Json(rule)))
}

/// Get a rule by ID
pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<Rule>, StatusCode> {
    let rule = state
        .engine
        .store()
        .repo()
        .get(rule_id)
        .await
        .map_err(error_status)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(rule))
}

/// Replace a rule's definition. Status is not touched here.
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
    Json(input): Json<CreateRuleRequest>,
) -> Result<Json<Rule>, StatusCode> {
    let update = input.into_create().map_err(error_status)?;
    let rule = state
        .engine
        .store()
        .repo()
        .update(rule_id, update)
        .await
        .map_err(error_status)?;

    // Pick up definition changes in the live snapshot
    state.engine.store().reload().await.map_err(error_status)?;
    Ok(Json(rule))
}

/// Delete a rule
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    state
        .engine
        .store()
        .repo()
        .delete(rule_id)
        .await
        .map_err(error_status)?;

    state.engine.store().reload().await.map_err(error_status)?;
    info!(%rule_id, "rule deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn change_status(
    state: &AppState,
    rule_id: Uuid,
    to: RuleStatus,
) -> Result<Json<Rule>, StatusCode> {
    let repo = state.engine.store().repo();
    let rule = repo
        .get(rule_id)
        .await
        .map_err(error_status)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let current = rule
        .status_enum()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    if !current.can_transition_to(to) {
        warn!(%rule_id, from = %current, to = %to, "rejected status transition");
        return Err(error_status(Error::InvalidTransition(format!(
            "{} -> {}",
            current, to
        ))));
    }

    repo.set_status(rule_id, to).await.map_err(error_status)?;
    if to == RuleStatus::Active && current == RuleStatus::Error {
        // A reactivated rule starts with a clean breaker
        repo.clear_failures(rule_id).await.map_err(error_status)?;
    }
    state.engine.store().reload().await.map_err(error_status)?;

    info!(%rule_id, from = %current, to = %to, "rule status changed");
    let rule = repo
        .get(rule_id)
        .await
        .map_err(error_status)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(rule))
}

/// Enable a rule (DRAFT/INACTIVE/TESTING -> ACTIVE)
pub async fn enable_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<Rule>, StatusCode> {
    change_status(&state, rule_id, RuleStatus::Active).await
}

/// Disable a rule (-> INACTIVE)
pub async fn disable_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<Rule>, StatusCode> {
    change_status(&state, rule_id, RuleStatus::Inactive).await
}

/// Reactivate a circuit-broken rule (ERROR -> ACTIVE, breaker cleared)
pub async fn reactivate_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<Rule>, StatusCode> {
    change_status(&state, rule_id, RuleStatus::Active).await
}

/// Deprecate a rule (terminal)
pub async fn deprecate_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<Rule>, StatusCode> {
    change_status(&state, rule_id, RuleStatus::Deprecated).await
}

/// Dry-run a rule against a synthetic event. No side effects.
pub async fn test_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
    Json(input): Json<EventRequest>,
) -> Result<Json<TestExecution>, StatusCode> {
    let event = input.into_event().map_err(error_status)?;
    let test = state
        .engine
        .test_execute(rule_id, &event, chrono::Utc::now())
        .await
        .map_err(error_status)?;
    Ok(Json(test))
}

#[derive(Debug, Deserialize)]
pub struct ExecutionsQuery {
    pub limit: Option<i64>,
}

/// List recent execution records for a rule
pub async fn list_rule_executions(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
    Query(query): Query<ExecutionsQuery>,
) -> Result<Json<Vec<ExecutionRecord>>, StatusCode> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let records = state
        .executions
        .list_for_rule(rule_id, limit)
        .await
        .map_err(error_status)?;
    Ok(Json(records))
}

/// Request body for a cooldown reset
#[derive(Debug, Deserialize)]
pub struct ResetCooldownRequest {
    pub sender: String,
}

#[derive(Debug, Serialize)]
pub struct ResetCooldownResponse {
    /// Whether an entry existed for this (rule, sender)
    pub reset: bool,
}

/// Clear the cooldown state for one (rule, sender) pair
pub async fn reset_cooldown(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
    Json(input): Json<ResetCooldownRequest>,
) -> Result<Json<ResetCooldownResponse>, StatusCode> {
    let sender = EmailAddress::parse(&input.sender)
        .ok_or_else(|| {
            error_status(Error::Validation(format!(
                "Invalid sender address: {:?}",
                input.sender
            )))
        })?
        .normalized();

    let reset = state.engine.cooldowns().reset(rule_id, &sender).await;
    info!(%rule_id, %sender, reset, "cooldown reset requested");
    Ok(Json(ResetCooldownResponse { reset }))
}
