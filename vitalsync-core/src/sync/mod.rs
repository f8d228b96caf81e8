//! Sync orchestration engine.
//!
//! This module keeps each user's local copy of their wearable data fresh
//! under the provider's dual-window rate limits, without an external task
//! queue.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          SyncScheduler                               │
//! │   (interval cycle: rank users by priority, staggered dispatch)       │
//! └───────────────┬──────────────────────────────────────────────────────┘
//!                 ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          SyncExecutor                                │
//! │                                                                      │
//! │  RateLimitTracker ──► EndpointFetcher ──► transform ──► Database     │
//! │   (dual-window        (one call per       (payload →    (upsert by   │
//! │    permit per call)    endpoint)           samples)      natural key)│
//! │                                                                      │
//! │  per-endpoint failures classified and recorded, never propagated     │
//! │  sync_logs audit row written after all endpoints attempted           │
//! │  baselines/patterns recomputed in a follow-up task per user          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod executor;
pub mod fetcher;
pub mod rate_limit;
pub mod scheduler;
pub mod transform;

pub use executor::{InFlightGuard, SyncExecutor};
pub use fetcher::{EndpointFetcher, EndpointRecord, ProviderClient};
pub use rate_limit::{Acquire, RateLimitSnapshot, RateLimitTracker};
pub use scheduler::{priority_for, CycleStats, SyncScheduler, SyncStatusSummary};
