//! IQR-based anomaly scanning against stored baselines.

use crate::db::Database;
use crate::error::Result;
use crate::types::{Anomaly, BaselineStatus, Direction};
use std::sync::Arc;

/// Compares each metric's latest value against its baseline bounds.
///
/// Metrics with `insufficient` baselines are silently skipped; no anomaly
/// is possible without a baseline.
pub struct AnomalyScanner {
    db: Arc<Database>,
}

impl AnomalyScanner {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// One anomaly per metric whose latest value escapes its warning
    /// bounds, escalated to critical outside the 3x-IQR bounds.
    pub fn scan(&self, user_id: &str) -> Result<Vec<Anomaly>> {
        tracing::debug!(user_id, "Scanning for anomalies");

        let mut anomalies = Vec::new();

        for baseline in self.db.get_baselines(user_id)? {
            if baseline.status == BaselineStatus::Insufficient {
                continue;
            }
            let Some(sample) = self.db.latest_sample(user_id, baseline.metric.as_str())? else {
                continue;
            };
            let Some(severity) = baseline.classify(sample.value) else {
                continue;
            };
            let Some((lower_bound, upper_bound)) = baseline.warning_bounds() else {
                continue;
            };

            let reference = baseline.mean_all.unwrap_or(0.0);
            let direction = if sample.value > reference {
                Direction::Above
            } else {
                Direction::Below
            };
            let deviation_percent = baseline
                .mean_all
                .filter(|&m| m != 0.0)
                .map(|m| (sample.value - m) / m * 100.0);

            anomalies.push(Anomaly {
                metric: baseline.metric,
                current_value: sample.value,
                baseline_value: reference,
                median: baseline.median,
                lower_bound,
                upper_bound,
                direction,
                severity,
                deviation_percent,
            });
        }

        tracing::debug!(user_id, anomaly_count = anomalies.len(), "Anomaly scan complete");
        Ok(anomalies)
    }
}
