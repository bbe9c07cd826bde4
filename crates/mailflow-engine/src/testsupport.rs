//! In-memory doubles and fixtures shared by the engine test modules

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use mailflow_common::config::BusinessHoursConfig;
use mailflow_common::types::{
    ActionConfig, EmailAddress, Event, EventId, RuleConditions, RuleId, RuleKind, RuleStatus,
};
use mailflow_common::{Error, Result};
use mailflow_storage::models::{CreateRule, ExecutionRecord, NewExecution, Rule, RuleCounts};
use mailflow_storage::{ExecutionRepositoryTrait, RuleRepositoryTrait};

use crate::actions::{
    DeliveryError, MailboxControl, Notifier, RenderedReply, ReplySender, TaskRequest, TaskService,
};
use crate::calendar::WeekdayCalendar;
use crate::cooldown::CooldownTracker;
use crate::engine::{AutomationEngine, EngineSettings};
use crate::executor::{ActionExecutor, RetryPolicy};
use crate::queue::WorkQueue;
use crate::recorder::ExecutionRecorder;
use crate::stats::StatsTracker;
use crate::store::{CompiledRule, RuleStore};

pub(crate) fn sample_event(from: &str, subject: &str, body: &str) -> Event {
    let address = EmailAddress::parse(from).expect("valid test address");
    let mut name = address.local.clone();
    if let Some(first) = name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    Event {
        id: Uuid::now_v7(),
        from: address,
        sender_name: Some(name),
        subject: subject.to_string(),
        body: body.to_string(),
        has_attachment: false,
        received_at: Utc::now(),
    }
}

pub(crate) fn rule_with_actions(
    name: &str,
    kind: RuleKind,
    priority: i32,
    actions: ActionConfig,
) -> Rule {
    let now = Utc::now();
    Rule {
        id: Uuid::now_v7(),
        name: name.to_string(),
        description: None,
        status: RuleStatus::Active.as_str().to_string(),
        kind: kind.as_str().to_string(),
        priority,
        conditions: serde_json::to_value(RuleConditions::default()).expect("serializable"),
        action_config: serde_json::to_value(actions).expect("serializable"),
        last_error: None,
        consecutive_failures: 0,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn active_rule_row(name: &str, kind: RuleKind, priority: i32) -> Rule {
    rule_with_actions(name, kind, priority, ActionConfig::default())
}

pub(crate) fn compiled_rule(
    name: &str,
    kind: RuleKind,
    priority: i32,
    actions: ActionConfig,
) -> CompiledRule {
    CompiledRule {
        id: Uuid::now_v7(),
        name: name.to_string(),
        kind,
        priority,
        created_at: Utc::now(),
        conditions: RuleConditions::default(),
        actions,
    }
}

/// Rule repository backed by a Vec
#[derive(Default)]
pub(crate) struct MemRuleRepository {
    rows: RwLock<Vec<Rule>>,
}

impl MemRuleRepository {
    pub async fn push(&self, rule: Rule) {
        self.rows.write().await.push(rule);
    }
}

fn ranked(mut rules: Vec<Rule>) -> Vec<Rule> {
    rules.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    rules
}

#[async_trait]
impl RuleRepositoryTrait for MemRuleRepository {
    async fn create(&self, input: CreateRule) -> Result<Rule> {
        let now = Utc::now();
        let rule = Rule {
            id: Uuid::now_v7(),
            name: input.name,
            description: input.description,
            status: RuleStatus::Draft.as_str().to_string(),
            kind: input.kind.as_str().to_string(),
            priority: input.priority,
            conditions: serde_json::to_value(input.conditions)
                .map_err(|e| Error::Internal(e.to_string()))?,
            action_config: serde_json::to_value(input.action_config)
                .map_err(|e| Error::Internal(e.to_string()))?,
            last_error: None,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.push(rule.clone());
        Ok(rule)
    }

    async fn get(&self, id: RuleId) -> Result<Option<Rule>> {
        Ok(self.rows.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Rule>> {
        Ok(ranked(self.rows.read().await.clone()))
    }

    async fn list_active(&self) -> Result<Vec<Rule>> {
        let active = self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.status == RuleStatus::Active.as_str())
            .cloned()
            .collect();
        Ok(ranked(active))
    }

    async fn update(&self, id: RuleId, input: CreateRule) -> Result<Rule> {
        let mut rows = self.rows.write().await;
        let rule = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("Rule {}", id)))?;
        rule.name = input.name;
        rule.description = input.description;
        rule.kind = input.kind.as_str().to_string();
        rule.priority = input.priority;
        rule.conditions =
            serde_json::to_value(input.conditions).map_err(|e| Error::Internal(e.to_string()))?;
        rule.action_config = serde_json::to_value(input.action_config)
            .map_err(|e| Error::Internal(e.to_string()))?;
        rule.updated_at = Utc::now();
        Ok(rule.clone())
    }

    async fn set_status(&self, id: RuleId, status: RuleStatus) -> Result<()> {
        let mut rows = self.rows.write().await;
        let rule = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("Rule {}", id)))?;
        rule.status = status.as_str().to_string();
        rule.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: RuleId) -> Result<()> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Err(Error::NotFound(format!("Rule {}", id)));
        }
        Ok(())
    }

    async fn record_failure(&self, id: RuleId, error: &str) -> Result<i32> {
        let mut rows = self.rows.write().await;
        let rule = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("Rule {}", id)))?;
        rule.consecutive_failures += 1;
        rule.last_error = Some(error.to_string());
        Ok(rule.consecutive_failures)
    }

    async fn clear_failures(&self, id: RuleId) -> Result<()> {
        let mut rows = self.rows.write().await;
        if let Some(rule) = rows.iter_mut().find(|r| r.id == id) {
            rule.consecutive_failures = 0;
        }
        Ok(())
    }

    async fn counts(&self) -> Result<RuleCounts> {
        let rows = self.rows.read().await;
        let mut counts = RuleCounts {
            total: rows.len() as i64,
            ..RuleCounts::default()
        };
        for rule in rows.iter() {
            match rule.status_enum() {
                Some(RuleStatus::Active) => counts.active += 1,
                Some(RuleStatus::Inactive) => counts.inactive += 1,
                Some(RuleStatus::Error) => counts.error += 1,
                _ => {}
            }
        }
        Ok(counts)
    }
}

/// Execution repository with the same composite-key idempotence as the
/// database index
#[derive(Default)]
pub(crate) struct MemExecutionRepository {
    rows: RwLock<Vec<ExecutionRecord>>,
}

#[async_trait]
impl ExecutionRepositoryTrait for MemExecutionRepository {
    async fn insert(&self, input: NewExecution) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let exists = rows.iter().any(|r| {
            r.rule_id == input.rule_id
                && r.event_id == input.event_id
                && r.attempt == input.attempt
        });
        if exists {
            return Ok(false);
        }
        rows.push(ExecutionRecord {
            id: Uuid::now_v7(),
            rule_id: input.rule_id,
            event_id: input.event_id,
            attempt: input.attempt,
            outcome: input.outcome.as_str().to_string(),
            error_detail: input.error_detail,
            elapsed_ms: input.elapsed_ms,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn list_for_rule(&self, rule_id: RuleId, limit: i64) -> Result<Vec<ExecutionRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .rev()
            .filter(|r| r.rule_id == rule_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ExecutionRecord>> {
        let rows = self.rows.read().await;
        Ok(rows.iter().rev().take(limit as usize).cloned().collect())
    }
}

/// Reply sender that plays back a scripted sequence of results.
/// An exhausted (or empty) script succeeds.
pub(crate) struct ScriptedReplySender {
    script: Mutex<VecDeque<std::result::Result<(), DeliveryError>>>,
    sent: Mutex<Vec<RenderedReply>>,
}

impl ScriptedReplySender {
    pub fn always_ok() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<std::result::Result<(), DeliveryError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub async fn sent_replies(&self) -> Vec<RenderedReply> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ReplySender for ScriptedReplySender {
    async fn send_reply(&self, reply: &RenderedReply) -> std::result::Result<(), DeliveryError> {
        let next = self.script.lock().await.pop_front().unwrap_or(Ok(()));
        if next.is_ok() {
            self.sent.lock().await.push(reply.clone());
        }
        next
    }
}

#[derive(Default)]
pub(crate) struct MemMailbox {
    pub read: Mutex<Vec<EventId>>,
    pub labels: Mutex<Vec<(EventId, String)>>,
    fail: bool,
}

impl MemMailbox {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MailboxControl for MemMailbox {
    async fn mark_read(&self, event_id: EventId) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("mailbox unavailable");
        }
        self.read.lock().await.push(event_id);
        Ok(())
    }

    async fn add_label(&self, event_id: EventId, label: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("mailbox unavailable");
        }
        self.labels.lock().await.push((event_id, label.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemTaskService {
    pub tasks: Mutex<Vec<TaskRequest>>,
}

#[async_trait]
impl TaskService for MemTaskService {
    async fn create_task(&self, task: &TaskRequest) -> anyhow::Result<()> {
        self.tasks.lock().await.push(task.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemNotifier {
    pub notices: Mutex<Vec<(String, EventId, String)>>,
}

#[async_trait]
impl Notifier for MemNotifier {
    async fn notify(&self, user: &str, event_id: EventId, message: &str) -> anyhow::Result<()> {
        self.notices
            .lock()
            .await
            .push((user.to_string(), event_id, message.to_string()));
        Ok(())
    }
}

/// A fully assembled engine over in-memory collaborators
pub(crate) struct EngineFixture {
    pub engine: Arc<AutomationEngine>,
    pub rules: Arc<MemRuleRepository>,
    pub executions: Arc<MemExecutionRepository>,
    pub replies: Arc<ScriptedReplySender>,
    pub mailbox: Arc<MemMailbox>,
    pub tasks: Arc<MemTaskService>,
    pub notifier: Arc<MemNotifier>,
}

impl EngineFixture {
    /// Insert an active rule row and make it visible to the engine
    pub async fn add_rule(&self, rule: Rule) -> RuleId {
        let id = rule.id;
        self.rules.push(rule).await;
        self.engine.store().reload().await.expect("reload");
        id
    }
}

pub(crate) async fn engine_fixture() -> EngineFixture {
    engine_fixture_with(ScriptedReplySender::always_ok()).await
}

pub(crate) async fn engine_fixture_with(replies: ScriptedReplySender) -> EngineFixture {
    let rules = Arc::new(MemRuleRepository::default());
    let executions = Arc::new(MemExecutionRepository::default());
    let replies = Arc::new(replies);
    let mailbox = Arc::new(MemMailbox::default());
    let tasks = Arc::new(MemTaskService::default());
    let notifier = Arc::new(MemNotifier::default());

    let store = Arc::new(RuleStore::new(rules.clone()));
    let stats = Arc::new(StatsTracker::new());
    let executor = Arc::new(ActionExecutor::new(
        replies.clone(),
        mailbox.clone(),
        tasks.clone(),
        notifier.clone(),
        RetryPolicy::new(3, 1),
    ));
    let recorder = Arc::new(ExecutionRecorder::new(
        store.clone(),
        executions.clone(),
        stats.clone(),
        5,
    ));
    let engine = Arc::new(AutomationEngine::new(
        store,
        Arc::new(CooldownTracker::new(7 * 86_400)),
        executor,
        recorder,
        Arc::new(WeekdayCalendar::new(&BusinessHoursConfig::default())),
        Arc::new(WorkQueue::new()),
        stats,
        EngineSettings::default(),
    ));

    EngineFixture {
        engine,
        rules,
        executions,
        replies,
        mailbox,
        tasks,
        notifier,
    }
}
