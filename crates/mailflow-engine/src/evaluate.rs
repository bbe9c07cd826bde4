//! Condition evaluation
//!
//! Pure filter: one event against one rule's condition set. Deterministic,
//! side-effect-free, no I/O, O(1) per rule. All present fields are
//! AND-combined; within the `*_contains` lists any listed term satisfies
//! the field.

use chrono::{Datelike, Timelike};
use mailflow_common::types::{Event, RuleConditions};

/// Does `event` satisfy `conditions`?
pub fn matches(conditions: &RuleConditions, event: &Event) -> bool {
    if let Some(expected) = &conditions.from_email {
        if !event.sender_key().eq_ignore_ascii_case(expected) {
            return false;
        }
    }

    if let Some(domain) = &conditions.from_domain {
        let sender_domain = event.from.domain.to_lowercase();
        let expected = domain.to_lowercase();
        // Suffix match: "vip.com" matches both vip.com and mail.vip.com
        let suffix_hit = sender_domain == expected
            || sender_domain.ends_with(&format!(".{}", expected));
        if !suffix_hit {
            return false;
        }
    }

    if !conditions.subject_contains.is_empty()
        && !any_term_matches(&conditions.subject_contains, &event.subject)
    {
        return false;
    }

    if !conditions.body_contains.is_empty()
        && !any_term_matches(&conditions.body_contains, &event.body)
    {
        return false;
    }

    if let Some(expected) = conditions.has_attachment {
        if event.has_attachment != expected {
            return false;
        }
    }

    // Time checks use the event timestamp in the rule's timezone
    let tz = conditions.timezone();
    let local = event.received_at.with_timezone(&tz);

    if let Some(range) = &conditions.time_range {
        let minute_of_day = local.hour() * 60 + local.minute();
        if !range.contains(minute_of_day) {
            return false;
        }
    }

    if !conditions.days_of_week.is_empty() {
        let day = local.weekday().num_days_from_monday() as u8;
        if !conditions.days_of_week.contains(&day) {
            return false;
        }
    }

    true
}

/// Any listed term found as a case-insensitive substring
fn any_term_matches(terms: &[String], haystack: &str) -> bool {
    let haystack = haystack.to_lowercase();
    terms.iter().any(|t| haystack.contains(&t.to_lowercase()))
}
