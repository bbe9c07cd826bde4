//! Incremental execution statistics
//!
//! Counters are updated as records are written, never recomputed by
//! scanning history. The rolling window only keeps attempted executions
//! (success or failure), so skips and deferrals do not dilute the
//! delivery success rate.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use mailflow_common::types::{ExecutionOutcome, RuleId};
use mailflow_storage::models::RuleCounts;

const WINDOW_HOURS: i64 = 24;

/// Totals per outcome since startup
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutcomeTotals {
    pub success: u64,
    pub primary_failure: u64,
    pub aux_failure: u64,
    pub cooldown_skipped: u64,
    pub deferred: u64,
    pub superseded: u64,
}

impl OutcomeTotals {
    fn bump(&mut self, outcome: ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Success => self.success += 1,
            ExecutionOutcome::PrimaryFailure => self.primary_failure += 1,
            ExecutionOutcome::AuxFailure => self.aux_failure += 1,
            ExecutionOutcome::CooldownSkipped => self.cooldown_skipped += 1,
            ExecutionOutcome::Deferred => self.deferred += 1,
            ExecutionOutcome::Superseded => self.superseded += 1,
        }
    }
}

/// Per-rule activity counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleActivity {
    pub fired: u64,
    pub failed: u64,
    pub last_outcome: Option<String>,
    pub last_executed_at: Option<DateTime<Utc>>,
}

/// Point-in-time statistics snapshot served by the API
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub started_at: DateTime<Utc>,
    pub totals: OutcomeTotals,
    /// Delivery success rate over the last 24 hours, None if nothing
    /// was attempted in the window
    pub success_rate_24h: Option<f64>,
    pub attempts_24h: u64,
    pub rules: RuleCounts,
    pub per_rule: HashMap<RuleId, RuleActivity>,
}

struct StatsInner {
    totals: OutcomeTotals,
    per_rule: HashMap<RuleId, RuleActivity>,
    // (when, delivery succeeded) for attempted executions only
    window: VecDeque<(DateTime<Utc>, bool)>,
}

/// Thread-safe incremental stats collector
pub struct StatsTracker {
    started_at: DateTime<Utc>,
    inner: RwLock<StatsInner>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            inner: RwLock::new(StatsInner {
                totals: OutcomeTotals::default(),
                per_rule: HashMap::new(),
                window: VecDeque::new(),
            }),
        }
    }

    pub async fn record(&self, rule_id: RuleId, outcome: ExecutionOutcome, now: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        inner.totals.bump(outcome);

        let activity = inner.per_rule.entry(rule_id).or_default();
        if outcome.is_fired() {
            activity.fired += 1;
        }
        if outcome == ExecutionOutcome::PrimaryFailure {
            activity.failed += 1;
        }
        activity.last_outcome = Some(outcome.as_str().to_string());
        activity.last_executed_at = Some(now);

        if outcome.is_fired() || outcome.is_breaker_input() {
            inner.window.push_back((now, outcome.is_fired()));
        }
        Self::prune(&mut inner.window, now);
    }

    fn prune(window: &mut VecDeque<(DateTime<Utc>, bool)>, now: DateTime<Utc>) {
        let horizon = now - Duration::hours(WINDOW_HOURS);
        while let Some((when, _)) = window.front() {
            if *when >= horizon {
                break;
            }
            window.pop_front();
        }
    }

    pub async fn snapshot(&self, rules: RuleCounts, now: DateTime<Utc>) -> EngineStats {
        let mut inner = self.inner.write().await;
        Self::prune(&mut inner.window, now);

        let attempts = inner.window.len() as u64;
        let successes = inner.window.iter().filter(|(_, ok)| *ok).count() as u64;
        let success_rate_24h = if attempts > 0 {
            Some(successes as f64 / attempts as f64)
        } else {
            None
        };

        EngineStats {
            started_at: self.started_at,
            totals: inner.totals.clone(),
            success_rate_24h,
            attempts_24h: attempts,
            rules,
            per_rule: inner.per_rule.clone(),
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn empty_counts() -> RuleCounts {
        RuleCounts {
            total: 0,
            active: 0,
            inactive: 0,
            error: 0,
        }
    }

    #[tokio::test]
    async fn counts_each_outcome_separately() {
        let stats = StatsTracker::new();
        let rule = Uuid::now_v7();
        let now = Utc::now();

        stats.record(rule, ExecutionOutcome::Success, now).await;
        stats.record(rule, ExecutionOutcome::Success, now).await;
        stats.record(rule, ExecutionOutcome::CooldownSkipped, now).await;
        stats.record(rule, ExecutionOutcome::PrimaryFailure, now).await;

        let snap = stats.snapshot(empty_counts(), now).await;
        assert_eq!(snap.totals.success, 2);
        assert_eq!(snap.totals.cooldown_skipped, 1);
        assert_eq!(snap.totals.primary_failure, 1);
        assert_eq!(snap.per_rule[&rule].fired, 2);
        assert_eq!(snap.per_rule[&rule].failed, 1);
    }

    #[tokio::test]
    async fn success_rate_ignores_skips_and_deferrals() {
        let stats = StatsTracker::new();
        let rule = Uuid::now_v7();
        let now = Utc::now();

        stats.record(rule, ExecutionOutcome::Success, now).await;
        stats.record(rule, ExecutionOutcome::PrimaryFailure, now).await;
        stats.record(rule, ExecutionOutcome::CooldownSkipped, now).await;
        stats.record(rule, ExecutionOutcome::Deferred, now).await;
        stats.record(rule, ExecutionOutcome::Superseded, now).await;

        let snap = stats.snapshot(empty_counts(), now).await;
        assert_eq!(snap.attempts_24h, 2);
        assert_eq!(snap.success_rate_24h, Some(0.5));
    }

    #[tokio::test]
    async fn window_drops_old_attempts() {
        let stats = StatsTracker::new();
        let rule = Uuid::now_v7();
        let old = Utc::now() - Duration::hours(30);
        let now = Utc::now();

        stats.record(rule, ExecutionOutcome::PrimaryFailure, old).await;
        stats.record(rule, ExecutionOutcome::Success, now).await;

        let snap = stats.snapshot(empty_counts(), now).await;
        assert_eq!(snap.attempts_24h, 1);
        assert_eq!(snap.success_rate_24h, Some(1.0));
        // lifetime totals keep everything
        assert_eq!(snap.totals.primary_failure, 1);
    }

    #[tokio::test]
    async fn aux_failure_counts_as_fired_and_successful_delivery() {
        let stats = StatsTracker::new();
        let rule = Uuid::now_v7();
        let now = Utc::now();

        stats.record(rule, ExecutionOutcome::AuxFailure, now).await;

        let snap = stats.snapshot(empty_counts(), now).await;
        assert_eq!(snap.per_rule[&rule].fired, 1);
        assert_eq!(snap.success_rate_24h, Some(1.0));
    }
}
