//! Mailflow - Mail automation server entry point

use anyhow::Result;
use axum::http::HeaderValue;
use mailflow_api::{create_router, AppState};
use mailflow_common::config::{Config, LoggingConfig};
use mailflow_engine::{
    ActionExecutor, AutomationEngine, AutomationWorker, CooldownTracker, EngineSettings,
    ExecutionRecorder, RetryPolicy, RuleStore, SmtpReplySender, StatsTracker, WeekdayCalendar,
    WebhookMailboxControl, WebhookNotifier, WebhookTaskService, WorkQueue,
};
use mailflow_storage::db::DatabasePool;
use mailflow_storage::repository::executions::DbExecutionRepository;
use mailflow_storage::repository::rules::DbRuleRepository;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Mailflow automation server...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    info!("Database connection established");

    // Run migrations
    db_pool.migrate().await?;
    info!("Database migrations completed");

    // Repositories
    let rules: Arc<dyn mailflow_storage::RuleRepositoryTrait> =
        Arc::new(DbRuleRepository::new(db_pool.clone()));
    let executions: Arc<dyn mailflow_storage::ExecutionRepositoryTrait> =
        Arc::new(DbExecutionRepository::new(db_pool.clone()));

    // Action collaborators
    let replies = Arc::new(SmtpReplySender::new(&config.smtp)?);
    let mailbox = Arc::new(WebhookMailboxControl::new(&config.webhooks)?);
    let tasks = Arc::new(WebhookTaskService::new(&config.webhooks)?);
    let notifier = Arc::new(WebhookNotifier::new(&config.webhooks)?);

    // Assemble the engine
    let store = Arc::new(RuleStore::new(rules));
    let stats = Arc::new(StatsTracker::new());
    let executor = Arc::new(ActionExecutor::new(
        replies,
        mailbox,
        tasks,
        notifier,
        RetryPolicy::new(
            config.engine.max_delivery_attempts,
            config.engine.retry_backoff_ms,
        ),
    ));
    let recorder = Arc::new(ExecutionRecorder::new(
        store.clone(),
        executions.clone(),
        stats.clone(),
        config.engine.circuit_breaker_threshold as i32,
    ));
    let engine = Arc::new(AutomationEngine::new(
        store,
        Arc::new(CooldownTracker::new(config.engine.cooldown_retention_secs)),
        executor,
        recorder,
        Arc::new(WeekdayCalendar::new(&config.business_hours)),
        Arc::new(WorkQueue::new()),
        stats,
        EngineSettings {
            throttle_run_all: config.engine.throttle_run_all,
        },
    ));

    // Load the initial rule snapshot
    let loaded = engine.store().reload().await?;
    info!(rules = loaded, "Rule snapshot loaded");

    // Start the automation worker
    let worker_handle = {
        let worker = AutomationWorker::new(engine.clone(), config.engine.tick_interval_secs);
        tokio::spawn(async move {
            worker.run().await;
        })
    };

    // Start the API server
    let api_handle = {
        let state = Arc::new(AppState {
            engine: engine.clone(),
            executions,
            db_pool: Some(db_pool.clone()),
        });
        let mut app = create_router(state);
        if !config.api.cors_origins.is_empty() {
            app = app.layer(cors_layer(&config.api.cors_origins)?);
        }
        let bind = format!("{}:{}", config.server.bind_address, config.api.port);
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        info!("Starting API server on {}", bind);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    info!("Mailflow server started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    worker_handle.abort();
    api_handle.abort();

    info!("Mailflow server shutdown complete");

    Ok(())
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| o.parse::<HeaderValue>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new().allow_origin(origins))
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},mailflow=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
