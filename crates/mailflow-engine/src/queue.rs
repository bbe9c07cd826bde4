//! In-process queue for delayed and deferred executions
//!
//! Jobs are ordered by due time in a binary heap. The automation worker
//! drains due jobs on each tick, so nothing here blocks or sleeps.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use mailflow_common::types::{Event, RuleId};

/// Why a job was queued instead of executed inline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobReason {
    /// Rule configured an execution delay
    Delay,
    /// Event arrived outside business hours
    BusinessHours,
}

impl JobReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobReason::Delay => "delay",
            JobReason::BusinessHours => "business_hours",
        }
    }
}

/// A rule execution scheduled for later
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub due: DateTime<Utc>,
    pub rule_id: RuleId,
    pub event: Event,
    pub attempt: i32,
    pub reason: JobReason,
}

struct QueueItem {
    job: ScheduledJob,
    seq: u64,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.job.due == other.job.due && self.seq == other.seq
    }
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    // Reversed so the heap pops the earliest due job first, seq breaks
    // ties in insertion order
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .job
            .due
            .cmp(&self.job.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered queue of scheduled jobs
pub struct WorkQueue {
    inner: Mutex<Inner>,
}

struct Inner {
    heap: BinaryHeap<QueueItem>,
    next_seq: u64,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
        }
    }

    pub async fn push(&self, job: ScheduledJob) {
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(QueueItem { job, seq });
    }

    /// Remove and return every job whose due time has passed
    pub async fn pop_due(&self, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        let mut inner = self.inner.lock().await;
        let mut due = Vec::new();
        while let Some(item) = inner.heap.peek() {
            if item.job.due > now {
                break;
            }
            if let Some(item) = inner.heap.pop() {
                due.push(item.job);
            }
        }
        due
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.heap.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.heap.is_empty()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::sample_event;
    use chrono::Duration;
    use uuid::Uuid;

    fn job_at(due: DateTime<Utc>) -> ScheduledJob {
        ScheduledJob {
            due,
            rule_id: Uuid::now_v7(),
            event: sample_event("anna@example.com", "hello", "hi"),
            attempt: 1,
            reason: JobReason::Delay,
        }
    }

    #[tokio::test]
    async fn pops_only_due_jobs_in_due_order() {
        let queue = WorkQueue::new();
        let now = Utc::now();
        queue.push(job_at(now + Duration::seconds(60))).await;
        queue.push(job_at(now - Duration::seconds(10))).await;
        queue.push(job_at(now - Duration::seconds(30))).await;

        let due = queue.pop_due(now).await;
        assert_eq!(due.len(), 2);
        assert!(due[0].due < due[1].due);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn same_due_time_pops_in_insertion_order() {
        let queue = WorkQueue::new();
        let now = Utc::now();
        let first = job_at(now);
        let second = job_at(now);
        let first_rule = first.rule_id;
        let second_rule = second.rule_id;
        queue.push(first).await;
        queue.push(second).await;

        let due = queue.pop_due(now).await;
        assert_eq!(due[0].rule_id, first_rule);
        assert_eq!(due[1].rule_id, second_rule);
    }

    #[tokio::test]
    async fn future_jobs_stay_queued() {
        let queue = WorkQueue::new();
        let now = Utc::now();
        queue.push(job_at(now + Duration::seconds(5))).await;
        assert!(queue.pop_due(now).await.is_empty());
        assert_eq!(queue.len().await, 1);
    }
}
