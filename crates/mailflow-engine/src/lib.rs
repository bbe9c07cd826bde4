//! Mailflow Engine - Rule evaluation and action execution
//!
//! This crate implements the automation pipeline: condition evaluation,
//! rule selection, per-sender cooldown tracking, templated action execution
//! with failure isolation, and execution recording with incremental stats.

pub mod actions;
pub mod calendar;
pub mod cooldown;
pub mod delivery;
pub mod engine;
pub mod evaluate;
pub mod executor;
pub mod queue;
pub mod recorder;
pub mod select;
pub mod stats;
pub mod store;
pub mod template;
pub mod webhook;
pub mod worker;

#[cfg(test)]
pub(crate) mod testsupport;

pub use actions::{
    DeliveryError, MailboxControl, Notifier, RenderedReply, ReplySender, TaskRequest, TaskService,
};
pub use calendar::{BusinessCalendar, WeekdayCalendar};
pub use cooldown::{CooldownTracker, CooldownVerdict};
pub use delivery::SmtpReplySender;
pub use engine::{AutomationEngine, EngineSettings, EventReport, TestExecution};
pub use evaluate::matches;
pub use executor::{ActionExecutor, ExecutionAttempt, RetryPolicy};
pub use queue::{JobReason, ScheduledJob, WorkQueue};
pub use recorder::ExecutionRecorder;
pub use select::{SelectionPlan, rank};
pub use stats::{EngineStats, StatsTracker};
pub use store::{CompiledRule, RuleSnapshot, RuleStore};
pub use template::TemplateRenderer;
pub use webhook::{WebhookMailboxControl, WebhookNotifier, WebhookTaskService};
pub use worker::AutomationWorker;
