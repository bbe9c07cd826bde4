//! Rule snapshot store
//!
//! Evaluation runs against an immutable snapshot of the active rule set.
//! Toggles and breaker trips take effect when the snapshot is reloaded;
//! an in-flight evaluation finishes under the snapshot it started with.

use chrono::{DateTime, Utc};
use mailflow_common::types::{ActionConfig, RuleConditions, RuleId, RuleKind};
use mailflow_common::Result;
use mailflow_storage::{Rule, RuleRepositoryTrait};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A rule compiled for the hot path: conditions and actions deserialized
/// once at load time, never rediscovered per event.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: RuleId,
    pub name: String,
    pub kind: RuleKind,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub conditions: RuleConditions,
    pub actions: ActionConfig,
}

impl CompiledRule {
    /// Compile a stored rule row. Returns None for rows with unknown kind
    /// or malformed payloads (which write-time validation should prevent).
    pub fn compile(rule: &Rule) -> Option<Self> {
        let kind = match rule.kind_enum() {
            Some(kind) => kind,
            None => {
                warn!(rule_id = %rule.id, kind = %rule.kind, "Skipping rule with unknown kind");
                return None;
            }
        };
        let conditions = match rule.parsed_conditions() {
            Ok(c) => c,
            Err(e) => {
                warn!(rule_id = %rule.id, "Skipping rule with malformed conditions: {}", e);
                return None;
            }
        };
        let actions = match rule.parsed_action_config() {
            Ok(a) => a,
            Err(e) => {
                warn!(rule_id = %rule.id, "Skipping rule with malformed action_config: {}", e);
                return None;
            }
        };

        Some(Self {
            id: rule.id,
            name: rule.name.clone(),
            kind,
            priority: rule.priority,
            created_at: rule.created_at,
            conditions,
            actions,
        })
    }
}

/// Immutable view of the active rule set
#[derive(Debug, Default)]
pub struct RuleSnapshot {
    pub rules: Vec<CompiledRule>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl RuleSnapshot {
    pub fn find(&self, id: RuleId) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

/// Source of truth for the engine's view of active rules
pub struct RuleStore {
    repo: Arc<dyn RuleRepositoryTrait>,
    current: RwLock<Arc<RuleSnapshot>>,
}

impl RuleStore {
    pub fn new(repo: Arc<dyn RuleRepositoryTrait>) -> Self {
        Self {
            repo,
            current: RwLock::new(Arc::new(RuleSnapshot::default())),
        }
    }

    /// Reload the snapshot from storage. Called at startup, after rule
    /// lifecycle changes, and on scheduler ticks.
    pub async fn reload(&self) -> Result<usize> {
        let rows = self.repo.list_active().await?;
        let rules: Vec<CompiledRule> = rows.iter().filter_map(CompiledRule::compile).collect();
        let count = rules.len();

        let snapshot = Arc::new(RuleSnapshot {
            rules,
            loaded_at: Some(Utc::now()),
        });

        *self.current.write().await = snapshot;
        debug!(count, "Rule snapshot reloaded");
        Ok(count)
    }

    /// Current snapshot; cheap to clone, safe for unrestricted concurrent use
    pub async fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.current.read().await.clone()
    }

    pub fn repo(&self) -> &Arc<dyn RuleRepositoryTrait> {
        &self.repo
    }
}
