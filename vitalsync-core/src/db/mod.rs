//! Database layer for vitalsync
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - Natural-key upserts for idempotent series writes

pub mod repo;
pub mod schema;

pub use repo::{Database, SyncStats};
