//! Cooldown tracking
//!
//! Shared mutable throttling state keyed by (rule, normalized sender).
//! The check-and-reserve step runs inside a single write-lock critical
//! section, so two concurrent events from the same sender cannot both pass
//! the check and double-fire. Counters and timestamps move only after the
//! primary action actually succeeds (commit); an abort releases the
//! reservation without touching them.

use chrono::{DateTime, Duration, Utc};
use mailflow_common::types::{ActionConfig, RuleId};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Result of a throttle check for one candidate rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownVerdict {
    Allowed,
    /// Lifetime per-sender cap reached; skipped until an operator reset
    SenderCapReached,
    /// Inside the cooldown window (or a concurrent fire is in flight)
    CoolingDown { remaining_secs: u64 },
}

impl CooldownVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CooldownVerdict::Allowed)
    }

    /// Human-readable detail for the execution record
    pub fn detail(&self) -> Option<String> {
        match self {
            CooldownVerdict::Allowed => None,
            CooldownVerdict::SenderCapReached => {
                Some("per-sender reply cap reached".to_string())
            }
            CooldownVerdict::CoolingDown { remaining_secs } => {
                Some(format!("cooling down, {}s remaining", remaining_secs))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct CooldownEntry {
    last_fired_at: Option<DateTime<Utc>>,
    fired_count: u32,
    /// A reservation is held while an execution for this key is in flight
    in_flight: bool,
    /// Cooldown of the owning rule, kept for eviction decisions
    cooldown_seconds: u64,
    touched_at: DateTime<Utc>,
}

type Key = (RuleId, String);

/// Per-(rule, sender) throttle state with lazy eviction
pub struct CooldownTracker {
    entries: RwLock<HashMap<Key, CooldownEntry>>,
    retention: Duration,
}

impl CooldownTracker {
    pub fn new(retention_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention: Duration::seconds(retention_secs as i64),
        }
    }

    /// Atomically check the throttle and reserve the key for execution.
    /// A successful verdict must be followed by `commit` or `abort`.
    pub async fn begin(
        &self,
        rule_id: RuleId,
        sender: &str,
        actions: &ActionConfig,
        now: DateTime<Utc>,
    ) -> CooldownVerdict {
        // No cap and no window configured: nothing to enforce, so take no
        // reservation and keep no state for this key.
        if actions.cooldown_seconds == 0 && actions.max_replies_per_sender == 0 {
            return CooldownVerdict::Allowed;
        }

        let key = (rule_id, sender.to_string());
        let mut entries = self.entries.write().await;

        let entry = entries.entry(key).or_insert_with(|| CooldownEntry {
            last_fired_at: None,
            fired_count: 0,
            in_flight: false,
            cooldown_seconds: actions.cooldown_seconds,
            touched_at: now,
        });
        entry.cooldown_seconds = actions.cooldown_seconds;
        entry.touched_at = now;

        let verdict = Self::verdict(entry, actions, now);
        if verdict.is_allowed() {
            entry.in_flight = true;
        }
        verdict
    }

    /// Read-only throttle check, used by dry-run test execution
    pub async fn peek(
        &self,
        rule_id: RuleId,
        sender: &str,
        actions: &ActionConfig,
        now: DateTime<Utc>,
    ) -> CooldownVerdict {
        let key = (rule_id, sender.to_string());
        let entries = self.entries.read().await;
        match entries.get(&key) {
            Some(entry) => {
                // Ignore in-flight reservations: a dry run reports steady state
                let mut probe = entry.clone();
                probe.in_flight = false;
                Self::verdict(&probe, actions, now)
            }
            None => CooldownVerdict::Allowed,
        }
    }

    /// Record a successful fire: increments the sender counter and starts
    /// the cooldown window.
    pub async fn commit(&self, rule_id: RuleId, sender: &str, now: DateTime<Utc>) {
        let key = (rule_id, sender.to_string());
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&key) {
            entry.in_flight = false;
            entry.last_fired_at = Some(now);
            entry.fired_count += 1;
            entry.touched_at = now;
        }
    }

    /// Release a reservation without counting a fire
    pub async fn abort(&self, rule_id: RuleId, sender: &str) {
        let key = (rule_id, sender.to_string());
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&key) {
            entry.in_flight = false;
        }
    }

    /// Operator reset: clears the counter and window for one key
    pub async fn reset(&self, rule_id: RuleId, sender: &str) -> bool {
        let key = (rule_id, sender.to_string());
        self.entries.write().await.remove(&key).is_some()
    }

    /// Drop entries idle past max(rule cooldown, retention window).
    /// Returns the number of evicted keys.
    pub async fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| {
            if entry.in_flight {
                return true;
            }
            let horizon = self
                .retention
                .max(Duration::seconds(entry.cooldown_seconds as i64));
            now - entry.touched_at < horizon
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "Evicted stale cooldown entries");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn verdict(entry: &CooldownEntry, actions: &ActionConfig, now: DateTime<Utc>) -> CooldownVerdict {
        if entry.in_flight {
            return CooldownVerdict::CoolingDown { remaining_secs: 0 };
        }

        if actions.max_replies_per_sender > 0
            && entry.fired_count >= actions.max_replies_per_sender
        {
            return CooldownVerdict::SenderCapReached;
        }

        if actions.cooldown_seconds > 0 {
            if let Some(last) = entry.last_fired_at {
                let elapsed = (now - last).num_seconds().max(0) as u64;
                if elapsed < actions.cooldown_seconds {
                    return CooldownVerdict::CoolingDown {
                        remaining_secs: actions.cooldown_seconds - elapsed,
                    };
                }
            }
        }

        CooldownVerdict::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn actions(cooldown_seconds: u64, max_replies_per_sender: u32) -> ActionConfig {
        ActionConfig {
            template: "hi".to_string(),
            cooldown_seconds,
            max_replies_per_sender,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cooldown_window_skips_second_event() {
        let tracker = CooldownTracker::new(3600);
        let rule = Uuid::new_v4();
        let config = actions(3600, 0);
        let t0 = Utc::now();

        assert!(tracker.begin(rule, "a@vip.com", &config, t0).await.is_allowed());
        tracker.commit(rule, "a@vip.com", t0).await;

        // 10 seconds later: still cooling
        let verdict = tracker
            .begin(rule, "a@vip.com", &config, t0 + Duration::seconds(10))
            .await;
        assert!(matches!(verdict, CooldownVerdict::CoolingDown { .. }));

        // After the window: allowed again
        let verdict = tracker
            .begin(rule, "a@vip.com", &config, t0 + Duration::seconds(3601))
            .await;
        assert!(verdict.is_allowed());
    }

    #[tokio::test]
    async fn test_sender_cap_is_permanent() {
        let tracker = CooldownTracker::new(3600);
        let rule = Uuid::new_v4();
        let config = actions(0, 2);
        let t0 = Utc::now();

        for i in 0..2 {
            let at = t0 + Duration::seconds(i);
            assert!(tracker.begin(rule, "a@b.com", &config, at).await.is_allowed());
            tracker.commit(rule, "a@b.com", at).await;
        }

        // Third fire never happens, regardless of elapsed time
        let verdict = tracker
            .begin(rule, "a@b.com", &config, t0 + Duration::days(30))
            .await;
        assert_eq!(verdict, CooldownVerdict::SenderCapReached);
    }

    #[tokio::test]
    async fn test_abort_does_not_count_a_fire() {
        let tracker = CooldownTracker::new(3600);
        let rule = Uuid::new_v4();
        let config = actions(3600, 1);
        let t0 = Utc::now();

        assert!(tracker.begin(rule, "a@b.com", &config, t0).await.is_allowed());
        tracker.abort(rule, "a@b.com").await;

        // Failed execution: the cap and window are untouched
        assert!(tracker.begin(rule, "a@b.com", &config, t0).await.is_allowed());
    }

    #[tokio::test]
    async fn test_in_flight_reservation_blocks_concurrent_fire() {
        let tracker = CooldownTracker::new(3600);
        let rule = Uuid::new_v4();
        let config = actions(3600, 0);
        let t0 = Utc::now();

        assert!(tracker.begin(rule, "a@b.com", &config, t0).await.is_allowed());
        // Second concurrent event for the same key must not pass
        let verdict = tracker.begin(rule, "a@b.com", &config, t0).await;
        assert!(!verdict.is_allowed());
    }

    #[tokio::test]
    async fn test_unthrottled_rule_never_blocks_concurrent_events() {
        let tracker = CooldownTracker::new(3600);
        let rule = Uuid::new_v4();
        let config = actions(0, 0);
        let t0 = Utc::now();

        // Two near-simultaneous events, neither committed yet: both pass
        assert!(tracker.begin(rule, "a@b.com", &config, t0).await.is_allowed());
        assert!(tracker.begin(rule, "a@b.com", &config, t0).await.is_allowed());

        tracker.commit(rule, "a@b.com", t0).await;
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn test_keys_are_per_sender_and_rule() {
        let tracker = CooldownTracker::new(3600);
        let rule_a = Uuid::new_v4();
        let rule_b = Uuid::new_v4();
        let config = actions(3600, 0);
        let t0 = Utc::now();

        assert!(tracker.begin(rule_a, "a@b.com", &config, t0).await.is_allowed());
        tracker.commit(rule_a, "a@b.com", t0).await;

        // Different sender and different rule are independent keys
        assert!(tracker.begin(rule_a, "c@d.com", &config, t0).await.is_allowed());
        assert!(tracker.begin(rule_b, "a@b.com", &config, t0).await.is_allowed());
    }

    #[tokio::test]
    async fn test_peek_never_mutates() {
        let tracker = CooldownTracker::new(3600);
        let rule = Uuid::new_v4();
        let config = actions(3600, 1);
        let t0 = Utc::now();

        assert!(tracker.peek(rule, "a@b.com", &config, t0).await.is_allowed());
        assert!(tracker.is_empty().await);

        tracker.begin(rule, "a@b.com", &config, t0).await;
        tracker.commit(rule, "a@b.com", t0).await;
        assert_eq!(
            tracker.peek(rule, "a@b.com", &config, t0).await,
            CooldownVerdict::SenderCapReached
        );
    }

    #[tokio::test]
    async fn test_reset_clears_the_cap() {
        let tracker = CooldownTracker::new(3600);
        let rule = Uuid::new_v4();
        let config = actions(0, 1);
        let t0 = Utc::now();

        tracker.begin(rule, "a@b.com", &config, t0).await;
        tracker.commit(rule, "a@b.com", t0).await;
        assert_eq!(
            tracker.begin(rule, "a@b.com", &config, t0).await,
            CooldownVerdict::SenderCapReached
        );

        assert!(tracker.reset(rule, "a@b.com").await);
        assert!(tracker.begin(rule, "a@b.com", &config, t0).await.is_allowed());
    }

    #[tokio::test]
    async fn test_eviction_honors_retention_and_cooldown() {
        let tracker = CooldownTracker::new(60);
        let rule = Uuid::new_v4();
        let t0 = Utc::now();

        // Short-cooldown entry evicts after the retention floor
        tracker.begin(rule, "short@b.com", &actions(10, 0), t0).await;
        tracker.commit(rule, "short@b.com", t0).await;

        // Long-cooldown entry outlives the retention floor
        tracker.begin(rule, "long@b.com", &actions(7200, 0), t0).await;
        tracker.commit(rule, "long@b.com", t0).await;

        let evicted = tracker.evict_stale(t0 + Duration::seconds(120)).await;
        assert_eq!(evicted, 1);
        assert_eq!(tracker.len().await, 1);

        let evicted = tracker.evict_stale(t0 + Duration::seconds(7300)).await;
        assert_eq!(evicted, 1);
        assert!(tracker.is_empty().await);
    }
}
