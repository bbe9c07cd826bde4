//! Execution record repository

use crate::db::DatabasePool;
use crate::models::{ExecutionRecord, NewExecution};
use async_trait::async_trait;
use mailflow_common::types::RuleId;
use mailflow_common::{Error, Result};
use uuid::Uuid;

/// Execution record repository trait
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Insert one record; returns false when the (rule, event, attempt)
    /// composite was already recorded (idempotent re-delivery).
    async fn insert(&self, input: NewExecution) -> Result<bool>;
    async fn list_for_rule(&self, rule_id: RuleId, limit: i64) -> Result<Vec<ExecutionRecord>>;
    async fn list_recent(&self, limit: i64) -> Result<Vec<ExecutionRecord>>;
}

/// Database execution record repository
#[derive(Clone)]
pub struct DbExecutionRepository {
    pool: DatabasePool,
}

impl DbExecutionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for DbExecutionRepository {
    async fn insert(&self, input: NewExecution) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO execution_records (
                id, rule_id, event_id, attempt, outcome, error_detail,
                elapsed_ms, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (rule_id, event_id, attempt) DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.rule_id)
        .bind(input.event_id)
        .bind(input.attempt)
        .bind(input.outcome.as_str())
        .bind(&input.error_detail)
        .bind(input.elapsed_ms)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_rule(&self, rule_id: RuleId, limit: i64) -> Result<Vec<ExecutionRecord>> {
        sqlx::query_as::<_, ExecutionRecord>(
            r#"
            SELECT * FROM execution_records
            WHERE rule_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(rule_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ExecutionRecord>> {
        sqlx::query_as::<_, ExecutionRecord>(
            "SELECT * FROM execution_records ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
