//! Database models

use chrono::{DateTime, Utc};
use mailflow_common::types::{
    ActionConfig, EventId, ExecutionOutcome, RuleConditions, RuleId, RuleKind, RuleStatus,
};
use mailflow_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Rule model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub description: Option<String>,
    /// Lifecycle status, see [`RuleStatus`]
    pub status: String,
    /// Rule kind, see [`RuleKind`]
    pub kind: String,
    pub priority: i32,
    /// Conditions as a validated JSON document
    pub conditions: serde_json::Value,
    /// Action configuration as a validated JSON document
    pub action_config: serde_json::Value,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Get status as an enum
    pub fn status_enum(&self) -> Option<RuleStatus> {
        RuleStatus::parse(&self.status)
    }

    /// Get kind as an enum
    pub fn kind_enum(&self) -> Option<RuleKind> {
        RuleKind::parse(&self.kind)
    }

    /// Deserialize the stored condition set
    pub fn parsed_conditions(&self) -> Result<RuleConditions> {
        serde_json::from_value(self.conditions.clone())
            .map_err(|e| Error::Internal(format!("Stored conditions are malformed: {}", e)))
    }

    /// Deserialize the stored action configuration
    pub fn parsed_action_config(&self) -> Result<ActionConfig> {
        serde_json::from_value(self.action_config.clone())
            .map_err(|e| Error::Internal(format!("Stored action_config is malformed: {}", e)))
    }
}

/// Input for creating a rule
#[derive(Debug, Clone)]
pub struct CreateRule {
    pub name: String,
    pub description: Option<String>,
    pub kind: RuleKind,
    pub priority: i32,
    pub conditions: RuleConditions,
    pub action_config: ActionConfig,
}

/// Execution record row: one per attempted rule per attempt, append-only
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: uuid::Uuid,
    pub rule_id: RuleId,
    pub event_id: EventId,
    pub attempt: i32,
    /// Outcome, see [`ExecutionOutcome`]
    pub outcome: String,
    pub error_detail: Option<String>,
    pub elapsed_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Get outcome as an enum
    pub fn outcome_enum(&self) -> Option<ExecutionOutcome> {
        ExecutionOutcome::parse(&self.outcome)
    }
}

/// Input for recording an execution attempt
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub rule_id: RuleId,
    pub event_id: EventId,
    pub attempt: i32,
    pub outcome: ExecutionOutcome,
    pub error_detail: Option<String>,
    pub elapsed_ms: i64,
}

/// Per-status rule counts for the stats surface
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleCounts {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub error: i64,
}
