//! Rule selection
//!
//! Orders the matched-rule set and splits it by resolution policy.
//! Ranking is total and deterministic: priority descending, creation time
//! ascending as the tie-break.

use crate::store::CompiledRule;
use mailflow_common::types::SelectionPolicy;

/// Matched rules split by selection policy, both ranked
#[derive(Debug, Default)]
pub struct SelectionPlan {
    /// First-match-wins candidates: the first non-throttled one executes,
    /// the rest are superseded.
    pub first_match: Vec<CompiledRule>,
    /// Run-all candidates: each executes independently.
    pub run_all: Vec<CompiledRule>,
}

/// Rank matched rules: priority descending, created_at ascending
pub fn rank(mut matched: Vec<CompiledRule>) -> Vec<CompiledRule> {
    matched.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    matched
}

/// Build the selection plan for one event's matched rules
pub fn plan(matched: Vec<CompiledRule>) -> SelectionPlan {
    let ranked = rank(matched);
    let mut plan = SelectionPlan::default();

    for rule in ranked {
        match rule.kind.selection_policy() {
            SelectionPolicy::FirstMatchWins => plan.first_match.push(rule),
            SelectionPolicy::RunAll => plan.run_all.push(rule),
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use mailflow_common::types::{ActionConfig, RuleConditions, RuleKind};
    use uuid::Uuid;

    fn rule(kind: RuleKind, priority: i32, age_secs: i64) -> CompiledRule {
        CompiledRule {
            id: Uuid::new_v4(),
            name: format!("{}-{}", kind, priority),
            kind,
            priority,
            created_at: Utc::now() - Duration::seconds(age_secs),
            conditions: RuleConditions::default(),
            actions: ActionConfig::default(),
        }
    }

    #[test]
    fn test_rank_priority_descending() {
        let ranked = rank(vec![
            rule(RuleKind::AutoReply, 40, 0),
            rule(RuleKind::AutoReply, 80, 0),
            rule(RuleKind::AutoReply, 60, 0),
        ]);
        let priorities: Vec<i32> = ranked.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![80, 60, 40]);
    }

    #[test]
    fn test_rank_ties_break_by_creation_time() {
        let older = rule(RuleKind::AutoReply, 50, 3600);
        let newer = rule(RuleKind::AutoReply, 50, 10);
        let older_id = older.id;

        let ranked = rank(vec![newer, older]);
        assert_eq!(ranked[0].id, older_id);
    }

    #[test]
    fn test_plan_splits_by_policy() {
        let plan = plan(vec![
            rule(RuleKind::Label, 90, 0),
            rule(RuleKind::AutoReply, 80, 0),
            rule(RuleKind::AutoReply, 40, 0),
            rule(RuleKind::Notify, 10, 0),
        ]);

        assert_eq!(plan.first_match.len(), 2);
        assert_eq!(plan.first_match[0].priority, 80);
        assert_eq!(plan.run_all.len(), 2);
        assert_eq!(plan.run_all[0].priority, 90);
    }

    #[test]
    fn test_rank_is_deterministic() {
        let rules = vec![
            rule(RuleKind::AutoReply, 10, 5),
            rule(RuleKind::AutoReply, 10, 50),
            rule(RuleKind::AutoReply, 99, 0),
        ];
        let a: Vec<_> = rank(rules.clone()).iter().map(|r| r.id).collect();
        let b: Vec<_> = rank(rules).iter().map(|r| r.id).collect();
        assert_eq!(a, b);
    }
}
