//! Common types for Mailflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for rules
pub type RuleId = Uuid;

/// Unique identifier for inbound events
pub type EventId = Uuid;

/// Unique identifier for execution records
pub type ExecutionId = Uuid;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1]))
        } else {
            None
        }
    }

    /// Normalized form used as the cooldown key: lowercase full address
    pub fn normalized(&self) -> String {
        format!("{}@{}", self.local, self.domain).to_lowercase()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

/// One inbound occurrence subject to rule matching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Sender address
    pub from: EmailAddress,
    /// Sender display name, if the source supplied one
    pub sender_name: Option<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub has_attachment: bool,
    pub received_at: DateTime<Utc>,
}

impl Event {
    /// Normalized sender address used for throttling keys
    pub fn sender_key(&self) -> String {
        self.from.normalized()
    }
}

/// Terminal outcome of one rule execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionOutcome {
    /// Primary action executed and succeeded
    Success,
    /// Primary action failed after retries exhausted
    PrimaryFailure,
    /// Primary succeeded but at least one auxiliary action failed
    AuxFailure,
    /// Skipped by the cooldown tracker (policy outcome, not an error)
    CooldownSkipped,
    /// Re-queued for a later scheduler tick (delay or business hours)
    Deferred,
    /// Outranked by a higher-priority first-match-wins rule
    Superseded,
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success => "SUCCESS",
            ExecutionOutcome::PrimaryFailure => "PRIMARY_FAILURE",
            ExecutionOutcome::AuxFailure => "AUX_FAILURE",
            ExecutionOutcome::CooldownSkipped => "COOLDOWN_SKIPPED",
            ExecutionOutcome::Deferred => "DEFERRED",
            ExecutionOutcome::Superseded => "SUPERSEDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(ExecutionOutcome::Success),
            "PRIMARY_FAILURE" => Some(ExecutionOutcome::PrimaryFailure),
            "AUX_FAILURE" => Some(ExecutionOutcome::AuxFailure),
            "COOLDOWN_SKIPPED" => Some(ExecutionOutcome::CooldownSkipped),
            "DEFERRED" => Some(ExecutionOutcome::Deferred),
            "SUPERSEDED" => Some(ExecutionOutcome::Superseded),
            _ => None,
        }
    }

    /// Whether this outcome represents a completed primary action
    pub fn is_fired(&self) -> bool {
        matches!(self, ExecutionOutcome::Success | ExecutionOutcome::AuxFailure)
    }

    /// Whether this outcome counts toward the circuit breaker
    pub fn is_breaker_input(&self) -> bool {
        matches!(self, ExecutionOutcome::PrimaryFailure)
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    Draft,
    Active,
    Inactive,
    Testing,
    /// Circuit-broken after consecutive primary failures; needs manual reactivation
    Error,
    /// Terminal
    Deprecated,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Draft => "DRAFT",
            RuleStatus::Active => "ACTIVE",
            RuleStatus::Inactive => "INACTIVE",
            RuleStatus::Testing => "TESTING",
            RuleStatus::Error => "ERROR",
            RuleStatus::Deprecated => "DEPRECATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(RuleStatus::Draft),
            "ACTIVE" => Some(RuleStatus::Active),
            "INACTIVE" => Some(RuleStatus::Inactive),
            "TESTING" => Some(RuleStatus::Testing),
            "ERROR" => Some(RuleStatus::Error),
            "DEPRECATED" => Some(RuleStatus::Deprecated),
            _ => None,
        }
    }

    /// Only ACTIVE rules are eligible for live matching
    pub fn is_eligible(&self) -> bool {
        matches!(self, RuleStatus::Active)
    }

    /// Whether an operator may move the rule from `self` to `to`
    pub fn can_transition_to(&self, to: RuleStatus) -> bool {
        use RuleStatus::*;
        if matches!(self, Deprecated) {
            return false;
        }
        match to {
            Deprecated => true,
            Active => matches!(self, Draft | Inactive | Testing | Error),
            Inactive | Testing => matches!(self, Draft | Active | Inactive | Testing),
            Draft => false,
            Error => false, // only the breaker moves a rule here
        }
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How simultaneous matches of the same kind are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Only the top-ranked non-throttled rule executes; the rest are superseded
    FirstMatchWins,
    /// Every matched, non-throttled rule executes independently
    RunAll,
}

/// Rule kind; determines the selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    /// Templated reply to the sender. Two replies to one message is a bug,
    /// so these resolve first-match-wins.
    AutoReply,
    Label,
    Task,
    Notify,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::AutoReply => "AUTO_REPLY",
            RuleKind::Label => "LABEL",
            RuleKind::Task => "TASK",
            RuleKind::Notify => "NOTIFY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTO_REPLY" => Some(RuleKind::AutoReply),
            "LABEL" => Some(RuleKind::Label),
            "TASK" => Some(RuleKind::Task),
            "NOTIFY" => Some(RuleKind::Notify),
            _ => None,
        }
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        match self {
            RuleKind::AutoReply => SelectionPolicy::FirstMatchWins,
            RuleKind::Label | RuleKind::Task | RuleKind::Notify => SelectionPolicy::RunAll,
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-of-day window in a rule-configured timezone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start, "HH:MM"
    pub start: String,
    /// Exclusive end, "HH:MM"
    pub end: String,
    /// IANA timezone name; UTC when unset
    pub timezone: Option<String>,
}

/// Parse an "HH:MM" string into minutes past midnight
pub fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h < 24 && m < 60 {
        Some(h * 60 + m)
    } else {
        None
    }
}

impl TimeRange {
    /// Whether `minute_of_day` falls inside this window. Overnight windows
    /// (start > end, e.g. 22:00-06:00) wrap past midnight.
    pub fn contains(&self, minute_of_day: u32) -> bool {
        let (Some(start), Some(end)) = (parse_hhmm(&self.start), parse_hhmm(&self.end)) else {
            return false;
        };
        if start <= end {
            minute_of_day >= start && minute_of_day < end
        } else {
            minute_of_day >= start || minute_of_day < end
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if parse_hhmm(&self.start).is_none() {
            return Err(crate::Error::Validation(format!(
                "Invalid time_range.start: {:?} (expected HH:MM)",
                self.start
            )));
        }
        if parse_hhmm(&self.end).is_none() {
            return Err(crate::Error::Validation(format!(
                "Invalid time_range.end: {:?} (expected HH:MM)",
                self.end
            )));
        }
        if let Some(tz) = &self.timezone {
            if tz.parse::<chrono_tz::Tz>().is_err() {
                return Err(crate::Error::Validation(format!(
                    "Unknown timezone: {:?}",
                    tz
                )));
            }
        }
        Ok(())
    }
}

/// Rule condition set. Unset fields impose no constraint; all present
/// fields are AND-combined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleConditions {
    /// Exact sender address, case-insensitive
    pub from_email: Option<String>,
    /// Sender domain suffix match, case-insensitive
    pub from_domain: Option<String>,
    /// Any listed term as a case-insensitive substring of the subject
    pub subject_contains: Vec<String>,
    /// Any listed term as a case-insensitive substring of the body
    pub body_contains: Vec<String>,
    pub has_attachment: Option<bool>,
    pub time_range: Option<TimeRange>,
    /// 0 = Monday .. 6 = Sunday, evaluated in the rule timezone
    pub days_of_week: Vec<u8>,
}

impl RuleConditions {
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(email) = &self.from_email {
            if EmailAddress::parse(email).is_none() {
                return Err(crate::Error::Validation(format!(
                    "Invalid from_email: {:?}",
                    email
                )));
            }
        }
        if let Some(domain) = &self.from_domain {
            if domain.is_empty() || domain.contains('@') {
                return Err(crate::Error::Validation(format!(
                    "Invalid from_domain: {:?}",
                    domain
                )));
            }
        }
        if self.subject_contains.iter().any(|t| t.is_empty()) {
            return Err(crate::Error::Validation(
                "subject_contains terms must be non-empty".to_string(),
            ));
        }
        if self.body_contains.iter().any(|t| t.is_empty()) {
            return Err(crate::Error::Validation(
                "body_contains terms must be non-empty".to_string(),
            ));
        }
        if let Some(range) = &self.time_range {
            range.validate()?;
        }
        if let Some(day) = self.days_of_week.iter().find(|d| **d > 6) {
            return Err(crate::Error::Validation(format!(
                "Invalid day_of_week: {} (expected 0-6, Monday=0)",
                day
            )));
        }
        Ok(())
    }

    /// Timezone used for time window / day-of-week checks
    pub fn timezone(&self) -> chrono_tz::Tz {
        self.time_range
            .as_ref()
            .and_then(|r| r.timezone.as_deref())
            .and_then(|tz| tz.parse().ok())
            .unwrap_or(chrono_tz::UTC)
    }
}

/// Action configuration attached to a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionConfig {
    /// Reply body with {{placeholders}}
    pub template: String,
    /// Reply subject; unset replies with "Re: <event subject>"
    pub subject_template: Option<String>,
    /// Advisory delay before execution; re-enqueued, never a blocking sleep
    pub delay_seconds: u32,
    /// Defer execution to the next business-hours tick when outside hours
    pub only_business_hours: bool,
    /// Lifetime cap per sender; 0 = unlimited
    pub max_replies_per_sender: u32,
    /// Minimum seconds between fires for the same sender
    pub cooldown_seconds: u64,
    pub mark_as_read: bool,
    pub add_label: Option<String>,
    pub create_task: bool,
    pub notify_users: Vec<String>,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            template: String::new(),
            subject_template: None,
            delay_seconds: 0,
            only_business_hours: false,
            max_replies_per_sender: 0,
            cooldown_seconds: 0,
            mark_as_read: false,
            add_label: None,
            create_task: false,
            notify_users: Vec::new(),
        }
    }
}

impl ActionConfig {
    pub fn validate(&self, kind: RuleKind) -> crate::Result<()> {
        if kind == RuleKind::AutoReply && self.template.trim().is_empty() {
            return Err(crate::Error::Validation(
                "AUTO_REPLY rules require a non-empty template".to_string(),
            ));
        }
        if let Some(label) = &self.add_label {
            if label.trim().is_empty() {
                return Err(crate::Error::Validation(
                    "add_label must be non-empty when set".to_string(),
                ));
            }
        }
        if self.notify_users.iter().any(|u| u.trim().is_empty()) {
            return Err(crate::Error::Validation(
                "notify_users entries must be non-empty".to_string(),
            ));
        }
        if kind == RuleKind::Label && self.add_label.is_none() {
            return Err(crate::Error::Validation(
                "LABEL rules require add_label".to_string(),
            ));
        }
        if kind == RuleKind::Notify && self.notify_users.is_empty() {
            return Err(crate::Error::Validation(
                "NOTIFY rules require at least one notify_users entry".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the rule replies to the sender (the primary action)
    pub fn has_reply(&self) -> bool {
        !self.template.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_email_address_parse() {
        let email = EmailAddress::parse("User@Example.com").unwrap();
        assert_eq!(email.local, "User");
        assert_eq!(email.domain, "Example.com");
        assert_eq!(email.normalized(), "user@example.com");
    }

    #[test]
    fn test_email_address_invalid() {
        assert!(EmailAddress::parse("invalid").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
    }

    #[test]
    fn test_outcome_roundtrip() {
        for outcome in [
            ExecutionOutcome::Success,
            ExecutionOutcome::PrimaryFailure,
            ExecutionOutcome::AuxFailure,
            ExecutionOutcome::CooldownSkipped,
            ExecutionOutcome::Deferred,
            ExecutionOutcome::Superseded,
        ] {
            assert_eq!(ExecutionOutcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(ExecutionOutcome::parse("NOPE"), None);
    }

    #[test]
    fn test_status_transitions() {
        assert!(RuleStatus::Draft.can_transition_to(RuleStatus::Active));
        assert!(RuleStatus::Active.can_transition_to(RuleStatus::Inactive));
        assert!(RuleStatus::Error.can_transition_to(RuleStatus::Active));
        assert!(!RuleStatus::Active.can_transition_to(RuleStatus::Error));
        assert!(!RuleStatus::Deprecated.can_transition_to(RuleStatus::Active));
        assert!(RuleStatus::Testing.can_transition_to(RuleStatus::Deprecated));
    }

    #[test]
    fn test_kind_policy() {
        assert_eq!(
            RuleKind::AutoReply.selection_policy(),
            SelectionPolicy::FirstMatchWins
        );
        assert_eq!(RuleKind::Label.selection_policy(), SelectionPolicy::RunAll);
        assert_eq!(RuleKind::Notify.selection_policy(), SelectionPolicy::RunAll);
    }

    #[test]
    fn test_time_range_contains() {
        let range = TimeRange {
            start: "09:00".to_string(),
            end: "17:00".to_string(),
            timezone: None,
        };
        assert!(range.contains(9 * 60));
        assert!(range.contains(16 * 60 + 59));
        assert!(!range.contains(17 * 60));
        assert!(!range.contains(8 * 60));
    }

    #[test]
    fn test_time_range_overnight() {
        let range = TimeRange {
            start: "22:00".to_string(),
            end: "06:00".to_string(),
            timezone: None,
        };
        assert!(range.contains(23 * 60));
        assert!(range.contains(5 * 60));
        assert!(!range.contains(12 * 60));
    }

    #[test]
    fn test_conditions_validate() {
        let mut conditions = RuleConditions {
            from_domain: Some("vip.com".to_string()),
            subject_contains: vec!["urgent".to_string()],
            ..Default::default()
        };
        assert!(conditions.validate().is_ok());

        conditions.days_of_week = vec![0, 7];
        assert!(conditions.validate().is_err());

        conditions.days_of_week = vec![0, 6];
        conditions.time_range = Some(TimeRange {
            start: "25:00".to_string(),
            end: "17:00".to_string(),
            timezone: None,
        });
        assert!(conditions.validate().is_err());

        conditions.time_range = Some(TimeRange {
            start: "09:00".to_string(),
            end: "17:00".to_string(),
            timezone: Some("Mars/Olympus".to_string()),
        });
        assert!(conditions.validate().is_err());
    }

    #[test]
    fn test_action_config_validate() {
        let config = ActionConfig {
            template: "Thanks {{name}}".to_string(),
            ..Default::default()
        };
        assert!(config.validate(RuleKind::AutoReply).is_ok());

        let empty = ActionConfig::default();
        assert!(empty.validate(RuleKind::AutoReply).is_err());
        assert!(empty.validate(RuleKind::Label).is_err());

        let label = ActionConfig {
            add_label: Some("vip".to_string()),
            ..Default::default()
        };
        assert!(label.validate(RuleKind::Label).is_ok());
    }

    #[test]
    fn test_conditions_deny_unknown_fields() {
        let raw = serde_json::json!({ "from_domain": "vip.com", "bogus": 1 });
        assert!(serde_json::from_value::<RuleConditions>(raw).is_err());
    }
}
