//! Mailflow Storage - Database abstraction
//!
//! This crate provides the PostgreSQL-backed persistence layer for Mailflow:
//! rule definitions and append-only execution records.

pub mod db;
pub mod models;
pub mod repository;

pub use db::{Database, DatabasePool};
pub use models::*;
pub use repository::*;
