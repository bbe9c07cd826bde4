//! Action collaborator traits
//!
//! The executor talks to the outside world only through these traits, so
//! every side effect is mockable and the pipeline is deterministic under
//! test. Collaborators must be idempotent-safe under retry.

use async_trait::async_trait;
use mailflow_common::types::{EventId, RuleId};
use thiserror::Error;

/// Delivery failure, split by whether a retry can help
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Worth retrying with backoff (timeouts, 4xx SMTP, connect errors)
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// Retrying cannot help (bad address, rejected content)
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

/// A rendered reply ready for delivery
#[derive(Debug, Clone)]
pub struct RenderedReply {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Rule that produced the reply, for provider-side tracing
    pub rule_id: RuleId,
    pub event_id: EventId,
}

/// Primary action: deliver a templated reply
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_reply(&self, reply: &RenderedReply) -> Result<(), DeliveryError>;
}

/// Auxiliary mailbox operations on the source message
#[async_trait]
pub trait MailboxControl: Send + Sync {
    async fn mark_read(&self, event_id: EventId) -> anyhow::Result<()>;
    async fn add_label(&self, event_id: EventId, label: &str) -> anyhow::Result<()>;
}

/// Task-creation request sent to the task service
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskRequest {
    pub rule_id: RuleId,
    pub event_id: EventId,
    pub title: String,
    pub description: String,
}

/// Auxiliary action: create a follow-up task
#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create_task(&self, task: &TaskRequest) -> anyhow::Result<()>;
}

/// Auxiliary action: notify users about a matched event
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user: &str, event_id: EventId, message: &str) -> anyhow::Result<()>;
}
