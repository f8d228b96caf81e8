//! Rolling personal baselines per (user, metric).
//!
//! Health metrics are rarely normally distributed, so anomaly bounds come
//! from IQR statistics rather than standard deviations. Each recompute
//! pulls up to 90 days of history and replaces the stored snapshot
//! wholesale.

use crate::analytics::stats;
use crate::config::AnalyticsConfig;
use crate::db::Database;
use crate::error::Result;
use crate::types::{Baseline, BaselineStatus, Metric};
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Full baseline requires three weeks of samples.
const MIN_SAMPLES_READY: usize = 21;
/// Partial baseline requires one week.
const MIN_SAMPLES_PARTIAL: usize = 7;
/// Sparse histories degrade gracefully: a 30-day mean needs at least 14
/// samples, a 90-day mean at least 60.
const MIN_SAMPLES_MEAN_30D: usize = 14;
const MIN_SAMPLES_MEAN_90D: usize = 60;

/// Computes and stores personal baselines.
pub struct BaselineEngine {
    db: Arc<Database>,
    config: AnalyticsConfig,
}

impl BaselineEngine {
    pub fn new(db: Arc<Database>, config: AnalyticsConfig) -> Self {
        Self { db, config }
    }

    /// Recompute every baseline metric for a user.
    ///
    /// Returns the status per metric. The metric set is a closed enum;
    /// adding a metric means adding a variant, not a registry string.
    pub fn compute_all(&self, user_id: &str) -> Result<BTreeMap<Metric, BaselineStatus>> {
        tracing::info!(user_id, "Calculating all baselines");

        let mut results = BTreeMap::new();
        for metric in Metric::BASELINE_SET {
            let baseline = self.compute(user_id, metric)?;
            results.insert(metric, baseline.status);
        }

        tracing::info!(user_id, ?results, "Baseline calculation complete");
        Ok(results)
    }

    /// Recompute one metric's baseline and replace the stored snapshot.
    pub fn compute(&self, user_id: &str, metric: Metric) -> Result<Baseline> {
        let since =
            Utc::now().date_naive() - Duration::days(self.config.baseline_window_days as i64);
        let series = self.db.get_series(user_id, metric.as_str(), since)?;

        // Most recent first, matching the rolling-mean windows below
        let mut samples = series;
        samples.reverse();

        let baseline = build_baseline(metric, &samples);
        self.db.replace_baseline(user_id, &baseline)?;

        tracing::debug!(
            user_id,
            metric = metric.as_str(),
            status = baseline.status.as_str(),
            sample_count = baseline.sample_count,
            "Baseline upserted"
        );

        Ok(baseline)
    }
}

/// Pure statistics over a series ordered most-recent-first.
fn build_baseline(metric: Metric, samples: &[crate::types::MetricSample]) -> Baseline {
    let sample_count = samples.len();
    let computed_at = Utc::now();

    let status = if sample_count >= MIN_SAMPLES_READY {
        BaselineStatus::Ready
    } else if sample_count >= MIN_SAMPLES_PARTIAL {
        BaselineStatus::Partial
    } else {
        BaselineStatus::Insufficient
    };

    if status == BaselineStatus::Insufficient {
        return Baseline {
            metric,
            mean_all: None,
            mean_7d: None,
            mean_30d: None,
            mean_90d: None,
            median: None,
            q1: None,
            q3: None,
            std_dev: None,
            min_value: None,
            max_value: None,
            sample_count,
            status,
            data_start_date: None,
            data_end_date: None,
            computed_at,
        };
    }

    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let window_mean = |window: usize, minimum: usize| {
        if sample_count >= minimum {
            stats::mean(&values[..window.min(sample_count)])
        } else {
            None
        }
    };

    let (q1, median, q3) = stats::quartiles(&values)
        .map(|(q1, median, q3)| (Some(q1), Some(median), Some(q3)))
        .unwrap_or((None, None, None));

    Baseline {
        metric,
        mean_all: stats::mean(&values),
        mean_7d: window_mean(7, MIN_SAMPLES_PARTIAL),
        mean_30d: window_mean(30, MIN_SAMPLES_MEAN_30D),
        mean_90d: window_mean(90, MIN_SAMPLES_MEAN_90D),
        median,
        q1,
        q3,
        std_dev: stats::std_dev(&values),
        min_value: values.iter().copied().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.min(v)))
        }),
        max_value: values.iter().copied().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.max(v)))
        }),
        sample_count,
        status,
        data_start_date: samples.iter().map(|s| s.date).min(),
        data_end_date: samples.iter().map(|s| s.date).max(),
        computed_at,
    }
}
