//! Rule repository

use crate::db::DatabasePool;
use crate::models::{CreateRule, Rule, RuleCounts};
use async_trait::async_trait;
use mailflow_common::types::{RuleId, RuleStatus};
use mailflow_common::{Error, Result};
use uuid::Uuid;

/// Rule repository trait
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn create(&self, input: CreateRule) -> Result<Rule>;
    async fn get(&self, id: RuleId) -> Result<Option<Rule>>;
    async fn list(&self) -> Result<Vec<Rule>>;
    /// Rules eligible for live matching, ranked for the selector
    async fn list_active(&self) -> Result<Vec<Rule>>;
    async fn update(&self, id: RuleId, input: CreateRule) -> Result<Rule>;
    async fn set_status(&self, id: RuleId, status: RuleStatus) -> Result<()>;
    async fn delete(&self, id: RuleId) -> Result<()>;
    /// Record a primary failure; returns the updated consecutive-failure run
    async fn record_failure(&self, id: RuleId, error: &str) -> Result<i32>;
    /// Clear the consecutive-failure run after a successful fire
    async fn clear_failures(&self, id: RuleId) -> Result<()>;
    async fn counts(&self) -> Result<RuleCounts>;
}

/// Database rule repository
#[derive(Clone)]
pub struct DbRuleRepository {
    pool: DatabasePool,
}

impl DbRuleRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleRepository for DbRuleRepository {
    async fn create(&self, input: CreateRule) -> Result<Rule> {
        let id = Uuid::now_v7();
        let now = chrono::Utc::now();
        let conditions = serde_json::to_value(&input.conditions)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let action_config = serde_json::to_value(&input.action_config)
            .map_err(|e| Error::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO rules (
                id, name, description, status, kind, priority,
                conditions, action_config, consecutive_failures,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, $10)
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(RuleStatus::Draft.as_str())
        .bind(input.kind.as_str())
        .bind(input.priority)
        .bind(&conditions)
        .bind(&action_config)
        .bind(now)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal("Failed to create rule".to_string()))
    }

    async fn get(&self, id: RuleId) -> Result<Option<Rule>> {
        sqlx::query_as::<_, Rule>("SELECT * FROM rules WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list(&self) -> Result<Vec<Rule>> {
        sqlx::query_as::<_, Rule>(
            "SELECT * FROM rules ORDER BY priority DESC, created_at ASC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<Rule>> {
        sqlx::query_as::<_, Rule>(
            r#"
            SELECT * FROM rules
            WHERE status = $1
            ORDER BY priority DESC, created_at ASC
            "#,
        )
        .bind(RuleStatus::Active.as_str())
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update(&self, id: RuleId, input: CreateRule) -> Result<Rule> {
        let conditions = serde_json::to_value(&input.conditions)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let action_config = serde_json::to_value(&input.action_config)
            .map_err(|e| Error::Internal(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE rules
            SET name = $2, description = $3, kind = $4, priority = $5,
                conditions = $6, action_config = $7, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.kind.as_str())
        .bind(input.priority)
        .bind(&conditions)
        .bind(&action_config)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Rule {}", id)));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Rule {}", id)))
    }

    async fn set_status(&self, id: RuleId, status: RuleStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE rules SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Rule {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: RuleId) -> Result<()> {
        let result = sqlx::query("DELETE FROM rules WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Rule {}", id)));
        }
        Ok(())
    }

    async fn record_failure(&self, id: RuleId, error: &str) -> Result<i32> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE rules
            SET consecutive_failures = consecutive_failures + 1,
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING consecutive_failures
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        row.map(|(n,)| n)
            .ok_or_else(|| Error::NotFound(format!("Rule {}", id)))
    }

    async fn clear_failures(&self, id: RuleId) -> Result<()> {
        sqlx::query(
            "UPDATE rules SET consecutive_failures = 0, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn counts(&self) -> Result<RuleCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM rules GROUP BY status")
                .fetch_all(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        let mut counts = RuleCounts::default();
        for (status, count) in rows {
            counts.total += count;
            match RuleStatus::parse(&status) {
                Some(RuleStatus::Active) => counts.active = count,
                Some(RuleStatus::Inactive) => counts.inactive = count,
                Some(RuleStatus::Error) => counts.error = count,
                _ => {}
            }
        }
        Ok(counts)
    }
}
