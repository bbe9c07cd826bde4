//! Webhook-backed action collaborators
//!
//! Auxiliary actions (task creation, user notification, mailbox updates)
//! are delegated to downstream services over HTTP. Each collaborator owns
//! its endpoint; a missing endpoint makes the action a logged no-op so a
//! partial deployment does not break rule execution.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use mailflow_common::config::WebhookConfig;
use mailflow_common::types::EventId;

use crate::actions::{MailboxControl, Notifier, TaskRequest, TaskService};

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to create HTTP client")
}

async fn post_json<T: serde::Serialize>(client: &Client, url: &str, body: &T) -> Result<()> {
    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;

    if !response.status().is_success() {
        return Err(anyhow!("{} returned status {}", url, response.status()));
    }
    Ok(())
}

/// Creates follow-up tasks via the configured task service endpoint
pub struct WebhookTaskService {
    client: Client,
    url: Option<String>,
}

impl WebhookTaskService {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config.task_url.clone(),
        })
    }
}

#[async_trait]
impl TaskService for WebhookTaskService {
    async fn create_task(&self, task: &TaskRequest) -> Result<()> {
        let Some(url) = &self.url else {
            warn!(rule_id = %task.rule_id, "task webhook not configured, skipping task creation");
            return Ok(());
        };
        post_json(&self.client, url, task).await?;
        debug!(rule_id = %task.rule_id, event_id = %task.event_id, "task created");
        Ok(())
    }
}

#[derive(serde::Serialize)]
struct NotifyPayload<'a> {
    user: &'a str,
    event_id: EventId,
    message: &'a str,
}

/// Pushes notifications to users via the configured notification endpoint
pub struct WebhookNotifier {
    client: Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config.notify_url.clone(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, user: &str, event_id: EventId, message: &str) -> Result<()> {
        let Some(url) = &self.url else {
            warn!(user, "notify webhook not configured, skipping notification");
            return Ok(());
        };
        let payload = NotifyPayload {
            user,
            event_id,
            message,
        };
        post_json(&self.client, url, &payload).await
    }
}

#[derive(serde::Serialize)]
struct MailboxPayload<'a> {
    event_id: EventId,
    op: &'a str,
    label: Option<&'a str>,
}

/// Applies mailbox updates (read state, labels) via the mailbox endpoint
pub struct WebhookMailboxControl {
    client: Client,
    url: Option<String>,
}

impl WebhookMailboxControl {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config.mailbox_url.clone(),
        })
    }
}

#[async_trait]
impl MailboxControl for WebhookMailboxControl {
    async fn mark_read(&self, event_id: EventId) -> Result<()> {
        let Some(url) = &self.url else {
            warn!(%event_id, "mailbox webhook not configured, skipping mark_read");
            return Ok(());
        };
        let payload = MailboxPayload {
            event_id,
            op: "mark_read",
            label: None,
        };
        post_json(&self.client, url, &payload).await
    }

    async fn add_label(&self, event_id: EventId, label: &str) -> Result<()> {
        let Some(url) = &self.url else {
            warn!(%event_id, "mailbox webhook not configured, skipping add_label");
            return Ok(());
        };
        let payload = MailboxPayload {
            event_id,
            op: "add_label",
            label: Some(label),
        };
        post_json(&self.client, url, &payload).await
    }
}
