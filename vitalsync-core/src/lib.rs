//! # vitalsync-core
//!
//! Core library for vitalsync - a sync orchestration and analytics engine
//! for per-user wearable health data.
//!
//! This library provides:
//! - Priority-based sync scheduling against a dual-window rate limit
//! - Per-endpoint failure isolation with a full audit trail
//! - Rolling personal baselines, pattern detection, and anomaly scanning
//! - Unified insight aggregation with progressive feature unlock
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Layer 0 (Upstream):** The provider API, consumed endpoint by endpoint
//! - **Layer 1 (Canonical):** Daily metric samples upserted by natural key
//! - **Layer 2 (Derived):** Baselines, patterns, anomalies, insights (regenerable)
//!
//! ## Example
//!
//! ```rust,no_run
//! use vitalsync_core::{Config, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod sync;
pub mod types;
