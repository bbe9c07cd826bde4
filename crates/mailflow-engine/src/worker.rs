//! Background automation worker
//!
//! One periodic loop drives everything time-based: due scheduled jobs,
//! rule snapshot refresh, and cooldown eviction. A failed cycle is logged
//! and the loop keeps ticking.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use mailflow_common::Result;

use crate::engine::AutomationEngine;

pub struct AutomationWorker {
    engine: Arc<AutomationEngine>,
    tick_interval: StdDuration,
}

impl AutomationWorker {
    pub fn new(engine: Arc<AutomationEngine>, tick_interval_secs: u64) -> Self {
        Self {
            engine,
            tick_interval: StdDuration::from_secs(tick_interval_secs.max(1)),
        }
    }

    /// Run the worker loop until the task is aborted
    pub async fn run(self) {
        info!(
            tick_secs = self.tick_interval.as_secs(),
            "automation worker started"
        );
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "automation worker cycle failed");
            }
        }
    }

    /// One worker cycle: run due jobs, refresh rules, evict stale cooldowns
    pub async fn run_cycle(&self) -> Result<()> {
        let now = Utc::now();

        let ran = self.engine.run_due(now).await?;
        if ran > 0 {
            debug!(ran, "scheduled executions processed");
        }

        self.engine.store().reload().await?;

        let evicted = self.engine.cooldowns().evict_stale(now).await;
        if evicted > 0 {
            debug!(evicted, "stale cooldown entries evicted");
        }

        Ok(())
    }
}
