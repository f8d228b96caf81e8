//! Analytics engine: baselines, patterns, anomalies, insights.
//!
//! Everything in this module is derived and regenerable from the stored
//! metric series. Snapshots (baselines, patterns) are replaced wholesale
//! on each recompute; anomalies and insights are computed on demand.
//!
//! ```text
//! metric_samples ──► BaselineEngine ──► baselines ──┐
//!        │                                          ├─► AnomalyScanner
//!        └─────────► PatternEngine  ──► patterns  ──┤
//!                                                   ▼
//!                                           InsightsService
//!                                      (+ ObservationGenerator)
//! ```

pub mod anomaly;
pub mod baseline;
pub mod insights;
pub mod observations;
pub mod pattern;
pub mod stats;

pub use anomaly::AnomalyScanner;
pub use baseline::BaselineEngine;
pub use insights::{InsightStatus, InsightsReport, InsightsService};
pub use observations::{Observation, ObservationGenerator, Suggestion};
pub use pattern::PatternEngine;
