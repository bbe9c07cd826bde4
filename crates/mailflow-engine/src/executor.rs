//! Action execution with retry and failure isolation
//!
//! Each rule kind has one primary action (the reply for auto-reply rules,
//! the defining side effect otherwise). The primary action decides the
//! outcome; auxiliary actions run afterwards and their failures are
//! collected without aborting the rest.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use tracing::{debug, warn};

use mailflow_common::types::{Event, ExecutionOutcome, RuleKind};

use crate::actions::{
    DeliveryError, MailboxControl, Notifier, RenderedReply, ReplySender, TaskRequest, TaskService,
};
use crate::store::CompiledRule;
use crate::template::TemplateRenderer;

/// Bounded retry with exponential backoff for transient delivery failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: StdDuration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: StdDuration::from_millis(backoff_ms),
        }
    }

    /// Backoff before the given retry, doubling per attempt
    fn backoff(&self, attempt: u32) -> StdDuration {
        self.initial_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Result of running one rule against one event
#[derive(Debug)]
pub struct ExecutionAttempt {
    pub outcome: ExecutionOutcome,
    pub error_detail: Option<String>,
    pub elapsed_ms: i64,
    pub delivery_attempts: u32,
}

pub struct ActionExecutor {
    renderer: TemplateRenderer,
    replies: Arc<dyn ReplySender>,
    mailbox: Arc<dyn MailboxControl>,
    tasks: Arc<dyn TaskService>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl ActionExecutor {
    pub fn new(
        replies: Arc<dyn ReplySender>,
        mailbox: Arc<dyn MailboxControl>,
        tasks: Arc<dyn TaskService>,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            renderer: TemplateRenderer::new(),
            replies,
            mailbox,
            tasks,
            notifier,
            retry,
        }
    }

    /// Render the reply a rule would send, without side effects
    pub fn render_preview(&self, rule: &CompiledRule, event: &Event) -> Option<RenderedReply> {
        if !rule.actions.has_reply() {
            return None;
        }
        Some(RenderedReply {
            to: event.from.normalized(),
            subject: self
                .renderer
                .render_subject(rule.actions.subject_template.as_deref(), event),
            body: self.renderer.render(&rule.actions.template, event),
            rule_id: rule.id,
            event_id: event.id,
        })
    }

    /// Run the rule's actions against the event
    pub async fn execute(&self, rule: &CompiledRule, event: &Event) -> ExecutionAttempt {
        let started = Instant::now();
        let mut delivery_attempts = 0;

        let primary = match rule.kind {
            RuleKind::AutoReply => self.send_reply_with_retry(rule, event, &mut delivery_attempts).await,
            RuleKind::Label => self.apply_label(rule, event).await,
            RuleKind::Task => self.create_task(rule, event).await,
            RuleKind::Notify => self.notify_all(rule, event).await,
        };

        if let Err(detail) = primary {
            warn!(rule_id = %rule.id, event_id = %event.id, error = %detail, "primary action failed");
            return ExecutionAttempt {
                outcome: ExecutionOutcome::PrimaryFailure,
                error_detail: Some(detail),
                elapsed_ms: started.elapsed().as_millis() as i64,
                delivery_attempts,
            };
        }

        let aux_errors = self.run_auxiliary(rule, event).await;
        let (outcome, error_detail) = if aux_errors.is_empty() {
            (ExecutionOutcome::Success, None)
        } else {
            (ExecutionOutcome::AuxFailure, Some(aux_errors.join("; ")))
        };

        debug!(
            rule_id = %rule.id,
            event_id = %event.id,
            outcome = outcome.as_str(),
            "rule executed"
        );

        ExecutionAttempt {
            outcome,
            error_detail,
            elapsed_ms: started.elapsed().as_millis() as i64,
            delivery_attempts,
        }
    }

    async fn send_reply_with_retry(
        &self,
        rule: &CompiledRule,
        event: &Event,
        delivery_attempts: &mut u32,
    ) -> Result<(), String> {
        let reply = self
            .render_preview(rule, event)
            .ok_or_else(|| "rule has no reply template".to_string())?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            *delivery_attempts = attempt;
            match self.replies.send_reply(&reply).await {
                Ok(()) => return Ok(()),
                Err(DeliveryError::Permanent(e)) => {
                    return Err(format!("permanent delivery failure: {}", e));
                }
                Err(DeliveryError::Transient(e)) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(format!(
                            "delivery failed after {} attempts: {}",
                            attempt, e
                        ));
                    }
                    let backoff = self.retry.backoff(attempt);
                    debug!(
                        rule_id = %rule.id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient delivery failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn apply_label(&self, rule: &CompiledRule, event: &Event) -> Result<(), String> {
        let label = rule
            .actions
            .add_label
            .as_deref()
            .ok_or_else(|| "rule has no label configured".to_string())?;
        self.mailbox
            .add_label(event.id, label)
            .await
            .map_err(|e| format!("add_label failed: {}", e))
    }

    async fn create_task(&self, rule: &CompiledRule, event: &Event) -> Result<(), String> {
        let task = TaskRequest {
            rule_id: rule.id,
            event_id: event.id,
            title: format!("Follow up: {}", event.subject),
            description: format!("Triggered by mail from {}", event.from),
        };
        self.tasks
            .create_task(&task)
            .await
            .map_err(|e| format!("create_task failed: {}", e))
    }

    async fn notify_all(&self, rule: &CompiledRule, event: &Event) -> Result<(), String> {
        let message = format!("Rule '{}' matched mail from {}", rule.name, event.from);
        let mut errors = Vec::new();
        for user in &rule.actions.notify_users {
            if let Err(e) = self.notifier.notify(user, event.id, &message).await {
                errors.push(format!("notify {} failed: {}", user, e));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    /// Run every configured action that is not the rule's primary.
    /// Failures are logged and collected, never propagated.
    async fn run_auxiliary(&self, rule: &CompiledRule, event: &Event) -> Vec<String> {
        let mut errors = Vec::new();

        if rule.actions.mark_as_read {
            if let Err(e) = self.mailbox.mark_read(event.id).await {
                errors.push(format!("mark_read failed: {}", e));
            }
        }

        if rule.kind != RuleKind::Label {
            if let Some(label) = rule.actions.add_label.as_deref() {
                if let Err(e) = self.mailbox.add_label(event.id, label).await {
                    errors.push(format!("add_label failed: {}", e));
                }
            }
        }

        if rule.kind != RuleKind::Task && rule.actions.create_task {
            if let Err(e) = self.create_task(rule, event).await {
                errors.push(e);
            }
        }

        if rule.kind != RuleKind::Notify && !rule.actions.notify_users.is_empty() {
            if let Err(e) = self.notify_all(rule, event).await {
                errors.push(e);
            }
        }

        for error in &errors {
            warn!(rule_id = %rule.id, event_id = %event.id, error = %error, "auxiliary action failed");
        }
        errors
    }
}
