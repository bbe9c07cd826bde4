//! Mailflow API - REST surface for rule management
//!
//! This crate provides the HTTP API for Mailflow: rule CRUD and lifecycle,
//! dry-run testing, cooldown resets, inbound event submission, and
//! engine statistics.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
