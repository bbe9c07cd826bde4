//! Inbound event handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use mailflow_common::types::{EmailAddress, Event};
use mailflow_common::Error;
use mailflow_engine::EventReport;
use mailflow_storage::models::ExecutionRecord;

use super::error_status;
use crate::state::AppState;

/// An inbound mail event as submitted by an upstream source
#[derive(Debug, Clone, Deserialize)]
pub struct EventRequest {
    /// Stable source event ID; generated when the source has none.
    /// Re-deliveries must reuse the original ID for dedup to work.
    pub id: Option<Uuid>,
    pub from: String,
    pub sender_name: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub has_attachment: bool,
    pub received_at: Option<DateTime<Utc>>,
}

impl EventRequest {
    pub(crate) fn into_event(self) -> Result<Event, Error> {
        let from = EmailAddress::parse(&self.from)
            .ok_or_else(|| Error::Validation(format!("Invalid sender address: {:?}", self.from)))?;
        Ok(Event {
            id: self.id.unwrap_or_else(Uuid::now_v7),
            from,
            sender_name: self.sender_name,
            subject: self.subject,
            body: self.body,
            has_attachment: self.has_attachment,
            received_at: self.received_at.unwrap_or_else(Utc::now),
        })
    }
}

/// Run an inbound event through the automation pipeline
pub async fn submit_event(
    State(state): State<Arc<AppState>>,
    Json(input): Json<EventRequest>,
) -> Result<Json<EventReport>, StatusCode> {
    let event = input.into_event().map_err(error_status)?;
    let report = state
        .engine
        .handle_event(&event, Utc::now())
        .await
        .map_err(error_status)?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

/// List the most recent execution records across all rules
pub async fn list_recent_executions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<ExecutionRecord>>, StatusCode> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let records = state
        .executions
        .list_recent(limit)
        .await
        .map_err(error_status)?;
    Ok(Json(records))
}
