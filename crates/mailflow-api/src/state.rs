//! Shared API state

use std::sync::Arc;

use mailflow_engine::AutomationEngine;
use mailflow_storage::{DatabasePool, ExecutionRepositoryTrait};

/// State shared by all handlers
pub struct AppState {
    pub engine: Arc<AutomationEngine>,
    pub executions: Arc<dyn ExecutionRepositoryTrait>,
    /// Absent when the API runs without a database (never in production)
    pub db_pool: Option<DatabasePool>,
}
