//! Request handlers

pub mod events;
pub mod health;
pub mod rules;
pub mod stats;

use axum::http::StatusCode;
use mailflow_common::Error;
use tracing::error;

/// Map a domain error to an HTTP status, logging server-side failures
pub(crate) fn error_status(e: Error) -> StatusCode {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(code = e.code(), "request failed: {}", e);
    }
    status
}
