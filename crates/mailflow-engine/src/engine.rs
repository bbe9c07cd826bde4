//! Automation engine orchestration
//!
//! Ties the pipeline together: evaluate conditions against the active
//! snapshot, rank and split by selection policy, gate through cooldowns,
//! execute or defer, and record every decision. All clock reads are
//! passed in so behavior is deterministic under test.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use mailflow_common::types::{Event, EventId, ExecutionOutcome, RuleId};
use mailflow_common::{Error, Result};
use mailflow_storage::models::NewExecution;

use crate::calendar::BusinessCalendar;
use crate::cooldown::{CooldownTracker, CooldownVerdict};
use crate::evaluate;
use crate::executor::ActionExecutor;
use crate::queue::{JobReason, ScheduledJob, WorkQueue};
use crate::recorder::ExecutionRecorder;
use crate::select;
use crate::stats::StatsTracker;
use crate::store::{CompiledRule, RuleStore};

/// Engine tunables lifted from configuration
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Whether run-all rules go through the cooldown gate too
    pub throttle_run_all: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            throttle_run_all: true,
        }
    }
}

/// One pipeline decision for one rule, reported back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub outcome: String,
    pub detail: Option<String>,
}

/// Summary of handling one inbound event
#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub event_id: EventId,
    /// Active rules evaluated
    pub evaluated: usize,
    /// Rules whose conditions matched
    pub matched: usize,
    pub decisions: Vec<Decision>,
}

/// Rendered reply preview from a dry run
#[derive(Debug, Clone, Serialize)]
pub struct ReplyPreview {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Dry-run result: what the rule would do, with no side effects
#[derive(Debug, Clone, Serialize)]
pub struct TestExecution {
    pub rule_id: RuleId,
    pub matched: bool,
    /// Throttle detail if the rule would currently be skipped
    pub throttled: Option<String>,
    /// When execution would actually happen if deferred or delayed
    pub would_run_at: Option<DateTime<Utc>>,
    pub reply: Option<ReplyPreview>,
}

pub struct AutomationEngine {
    store: Arc<RuleStore>,
    cooldowns: Arc<CooldownTracker>,
    executor: Arc<ActionExecutor>,
    recorder: Arc<ExecutionRecorder>,
    calendar: Arc<dyn BusinessCalendar>,
    queue: Arc<WorkQueue>,
    stats: Arc<StatsTracker>,
    settings: EngineSettings,
}

impl AutomationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<RuleStore>,
        cooldowns: Arc<CooldownTracker>,
        executor: Arc<ActionExecutor>,
        recorder: Arc<ExecutionRecorder>,
        calendar: Arc<dyn BusinessCalendar>,
        queue: Arc<WorkQueue>,
        stats: Arc<StatsTracker>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            cooldowns,
            executor,
            recorder,
            calendar,
            queue,
            stats,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Run one inbound event through the whole pipeline
    pub async fn handle_event(&self, event: &Event, now: DateTime<Utc>) -> Result<EventReport> {
        let snapshot = self.store.snapshot().await;
        let evaluated = snapshot.rules.len();

        let matched: Vec<CompiledRule> = snapshot
            .rules
            .iter()
            .filter(|rule| evaluate::matches(&rule.conditions, event))
            .cloned()
            .collect();
        let matched_count = matched.len();

        debug!(
            event_id = %event.id,
            evaluated,
            matched = matched_count,
            "event evaluated"
        );

        let plan = select::plan(matched);
        let mut decisions = Vec::new();

        // First-match-wins walk: throttled candidates are skipped in rank
        // order, the first eligible one fires, everything after it is
        // superseded.
        let mut winner_found = false;
        for rule in &plan.first_match {
            if winner_found {
                decisions.push(
                    self.record_decision(rule, event, 1, ExecutionOutcome::Superseded, None)
                        .await?,
                );
                continue;
            }
            let decision = self.gate_and_execute(rule, event, 1, true, now).await?;
            if decision.outcome != ExecutionOutcome::CooldownSkipped.as_str() {
                winner_found = true;
            }
            decisions.push(decision);
        }

        // Run-all rules execute independently of each other and of the
        // first-match winner.
        for rule in &plan.run_all {
            let decision = self
                .gate_and_execute(rule, event, 1, self.settings.throttle_run_all, now)
                .await?;
            decisions.push(decision);
        }

        if !decisions.is_empty() {
            info!(
                event_id = %event.id,
                sender = %event.from,
                decisions = decisions.len(),
                "event handled"
            );
        }

        Ok(EventReport {
            event_id: event.id,
            evaluated,
            matched: matched_count,
            decisions,
        })
    }

    /// Execute every queued job that is due. Returns how many ran.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.queue.pop_due(now).await;
        let count = due.len();
        for job in due {
            if let Err(e) = self.run_scheduled(job, now).await {
                warn!(error = %e, "scheduled execution failed");
            }
        }
        Ok(count)
    }

    async fn run_scheduled(&self, job: ScheduledJob, now: DateTime<Utc>) -> Result<()> {
        let snapshot = self.store.snapshot().await;
        let Some(rule) = snapshot.find(job.rule_id).cloned() else {
            // Rule was deactivated or deleted while the job waited
            debug!(rule_id = %job.rule_id, "dropping scheduled job for inactive rule");
            return Ok(());
        };

        let throttle = match rule.kind.selection_policy() {
            mailflow_common::types::SelectionPolicy::FirstMatchWins => true,
            mailflow_common::types::SelectionPolicy::RunAll => self.settings.throttle_run_all,
        };
        self.gate_and_execute(&rule, &job.event, job.attempt, throttle, now)
            .await?;
        Ok(())
    }

    /// Dry-run a rule against an event: evaluates, checks the throttle
    /// read-only, and renders the reply, with no side effects.
    pub async fn test_execute(
        &self,
        rule_id: RuleId,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<TestExecution> {
        let row = self
            .store
            .repo()
            .get(rule_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Rule {}", rule_id)))?;
        let rule = CompiledRule::compile(&row)
            .ok_or_else(|| Error::Validation("rule configuration is malformed".to_string()))?;

        let matched = evaluate::matches(&rule.conditions, event);
        if !matched {
            return Ok(TestExecution {
                rule_id,
                matched: false,
                throttled: None,
                would_run_at: None,
                reply: None,
            });
        }

        let verdict = self
            .cooldowns
            .peek(rule.id, &event.sender_key(), &rule.actions, now)
            .await;

        let would_run_at = self.deferral_for(&rule, now).map(|(due, _)| due);
        let reply = self
            .executor
            .render_preview(&rule, event)
            .map(|r| ReplyPreview {
                to: r.to,
                subject: r.subject,
                body: r.body,
            });

        Ok(TestExecution {
            rule_id,
            matched: true,
            throttled: verdict.detail(),
            would_run_at,
            reply,
        })
    }

    /// When the rule would run if not immediately, and why
    fn deferral_for(
        &self,
        rule: &CompiledRule,
        now: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, JobReason)> {
        if rule.actions.only_business_hours && !self.calendar.is_open(now) {
            return Some((self.calendar.next_open(now), JobReason::BusinessHours));
        }
        if rule.actions.delay_seconds > 0 {
            return Some((
                now + Duration::seconds(rule.actions.delay_seconds as i64),
                JobReason::Delay,
            ));
        }
        None
    }

    /// Cooldown gate, deferral gate, then execution, in that order.
    ///
    /// The cooldown reservation taken here is committed only when the
    /// primary action succeeds; deferral and failure both release it.
    async fn gate_and_execute(
        &self,
        rule: &CompiledRule,
        event: &Event,
        attempt: i32,
        throttle: bool,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        let sender = event.sender_key();

        if throttle {
            let verdict = self
                .cooldowns
                .begin(rule.id, &sender, &rule.actions, now)
                .await;
            if !verdict.is_allowed() {
                return self
                    .record_decision(
                        rule,
                        event,
                        attempt,
                        ExecutionOutcome::CooldownSkipped,
                        verdict.detail(),
                    )
                    .await;
            }
        }

        // A deferral is only a scheduling decision, not a fire: release
        // the reservation and re-check the throttle when the job runs.
        if let Some((due, reason)) = self.deferral_for(rule, now) {
            // Delay applies only on the first pass; a job re-entering
            // here after its delay must not be delayed again.
            let requeue = match reason {
                JobReason::BusinessHours => true,
                JobReason::Delay => attempt == 1,
            };
            if requeue {
                if throttle {
                    self.cooldowns.abort(rule.id, &sender).await;
                }
                self.queue
                    .push(ScheduledJob {
                        due,
                        rule_id: rule.id,
                        event: event.clone(),
                        attempt: attempt + 1,
                        reason,
                    })
                    .await;
                return self
                    .record_decision(
                        rule,
                        event,
                        attempt,
                        ExecutionOutcome::Deferred,
                        Some(format!("{} until {}", reason.as_str(), due.to_rfc3339())),
                    )
                    .await;
            }
        }

        let result = self.executor.execute(rule, event).await;
        if throttle {
            match result.outcome {
                ExecutionOutcome::Success | ExecutionOutcome::AuxFailure => {
                    self.cooldowns.commit(rule.id, &sender, now).await;
                }
                _ => self.cooldowns.abort(rule.id, &sender).await,
            }
        }

        let decision = Decision {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            outcome: result.outcome.as_str().to_string(),
            detail: result.error_detail.clone(),
        };
        self.recorder
            .record(NewExecution {
                rule_id: rule.id,
                event_id: event.id,
                attempt,
                outcome: result.outcome,
                error_detail: result.error_detail,
                elapsed_ms: result.elapsed_ms,
            })
            .await?;
        Ok(decision)
    }

    async fn record_decision(
        &self,
        rule: &CompiledRule,
        event: &Event,
        attempt: i32,
        outcome: ExecutionOutcome,
        detail: Option<String>,
    ) -> Result<Decision> {
        self.recorder
            .record(NewExecution {
                rule_id: rule.id,
                event_id: event.id,
                attempt,
                outcome,
                error_detail: detail.clone(),
                elapsed_ms: 0,
            })
            .await?;
        Ok(Decision {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            outcome: outcome.as_str().to_string(),
            detail,
        })
    }
}
