//! Execution recording and the rule circuit breaker
//!
//! Every pipeline decision lands here as an immutable record keyed by
//! (rule, event, attempt). Duplicate deliveries of the same event hit the
//! composite unique index and become no-ops, so stats and the breaker
//! only ever move once per decision.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use mailflow_common::types::{ExecutionOutcome, RuleStatus};
use mailflow_common::Result;
use mailflow_storage::models::NewExecution;
use mailflow_storage::ExecutionRepositoryTrait;

use crate::stats::StatsTracker;
use crate::store::RuleStore;

pub struct ExecutionRecorder {
    store: Arc<RuleStore>,
    executions: Arc<dyn ExecutionRepositoryTrait>,
    stats: Arc<StatsTracker>,
    /// Consecutive primary failures before a rule trips to ERROR
    breaker_threshold: i32,
}

impl ExecutionRecorder {
    pub fn new(
        store: Arc<RuleStore>,
        executions: Arc<dyn ExecutionRepositoryTrait>,
        stats: Arc<StatsTracker>,
        breaker_threshold: i32,
    ) -> Self {
        Self {
            store,
            executions,
            stats,
            breaker_threshold,
        }
    }

    /// Persist one execution record.
    ///
    /// Returns true when the record was newly written. Stats and breaker
    /// state advance only on first write.
    pub async fn record(&self, record: NewExecution) -> Result<bool> {
        let rule_id = record.rule_id;
        let outcome = record.outcome;
        let error_detail = record.error_detail.clone();

        let inserted = self.executions.insert(record).await?;
        if !inserted {
            debug!(
                %rule_id,
                outcome = outcome.as_str(),
                "duplicate execution record ignored"
            );
            return Ok(false);
        }

        self.stats.record(rule_id, outcome, Utc::now()).await;

        match outcome {
            ExecutionOutcome::PrimaryFailure => {
                let detail = error_detail.as_deref().unwrap_or("primary action failed");
                let consecutive = self.store.repo().record_failure(rule_id, detail).await?;
                if consecutive >= self.breaker_threshold {
                    warn!(
                        %rule_id,
                        consecutive,
                        "circuit breaker tripped, rule moved to ERROR"
                    );
                    self.store.repo().set_status(rule_id, RuleStatus::Error).await?;
                    // The tripped rule must not be selectable for the very
                    // next event, not just after the next scheduler tick.
                    self.store.reload().await?;
                }
            }
            ExecutionOutcome::Success | ExecutionOutcome::AuxFailure => {
                self.store.repo().clear_failures(rule_id).await?;
            }
            // Skips, deferrals and supersessions say nothing about the
            // rule's health
            _ => {}
        }

        Ok(true)
    }
}
