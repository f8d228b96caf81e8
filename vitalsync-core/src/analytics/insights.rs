//! Unified insights aggregation with progressive feature unlock.
//!
//! New users start with nothing: features unlock as history accumulates
//! (7 days for short baselines, 21 for patterns and anomaly detection,
//! 30 for full baselines, 60 reserved for future modeling). The aggregator
//! combines every analytics engine's output into one payload for the
//! downstream coaching layer.

use crate::analytics::anomaly::AnomalyScanner;
use crate::analytics::observations::{Observation, ObservationGenerator, Suggestion};
use crate::db::Database;
use crate::error::Result;
use crate::types::{Anomaly, Baseline, BaselineStatus, Metric, Pattern, TrendDirection};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Days of history required per feature.
pub const UNLOCK_BASELINES_7D: u32 = 7;
pub const UNLOCK_PATTERNS: u32 = 21;
pub const UNLOCK_ANOMALY_DETECTION: u32 = 21;
pub const UNLOCK_BASELINES_30D: u32 = 30;
/// Reserved for a future modeling phase; gates nothing yet.
pub const UNLOCK_ML_PREDICTIONS: u32 = 60;

const UNLOCKS: [(&str, u32); 5] = [
    ("baselines_7d", UNLOCK_BASELINES_7D),
    ("patterns", UNLOCK_PATTERNS),
    ("anomaly_detection", UNLOCK_ANOMALY_DETECTION),
    ("baselines_30d", UNLOCK_BASELINES_30D),
    ("ml_predictions", UNLOCK_ML_PREDICTIONS),
];

/// Overall insight readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    /// Below the first unlock threshold
    Unavailable,
    /// Some features still locked
    Partial,
    /// All non-reserved features unlocked
    Ready,
}

/// Availability of one feature.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureStatus {
    pub available: bool,
    pub message: Option<String>,
    pub unlock_at_days: u32,
}

/// Availability of every progressive feature.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureAvailability {
    pub baselines_7d: FeatureStatus,
    pub baselines_30d: FeatureStatus,
    pub patterns: FeatureStatus,
    pub anomaly_detection: FeatureStatus,
    pub ml_predictions: FeatureStatus,
}

/// Progress toward the next locked feature.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockProgress {
    pub next_unlock: String,
    pub days_until_next: u32,
    pub percent_to_next: f64,
}

/// Latest observed values of the headline metrics.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentMetrics {
    pub hrv: Option<f64>,
    pub sleep_score: Option<f64>,
    pub resting_hr: Option<f64>,
    pub training_load_ratio: Option<f64>,
}

/// Current value measured against the stored baseline.
#[derive(Debug, Clone, Serialize)]
pub struct BaselineComparison {
    pub current: Option<f64>,
    pub baseline: Option<f64>,
    pub baseline_7d: Option<f64>,
    pub baseline_30d: Option<f64>,
    pub percent_of_baseline: Option<f64>,
    pub trend: Option<TrendDirection>,
    pub status: BaselineStatus,
}

/// Complete insight payload for one user.
#[derive(Debug, Serialize)]
pub struct InsightsReport {
    pub user_id: String,
    pub generated_at: DateTime<Utc>,
    pub data_age_days: u32,
    pub data_freshness: Option<NaiveDate>,
    pub status: InsightStatus,
    pub feature_availability: FeatureAvailability,
    pub unlock_progress: Option<UnlockProgress>,
    pub current_metrics: CurrentMetrics,
    pub baselines: BTreeMap<String, BaselineComparison>,
    pub patterns: Vec<Pattern>,
    pub anomalies: Vec<Anomaly>,
    pub observations: Vec<Observation>,
    pub suggestions: Vec<Suggestion>,
}

/// Aggregates baselines, patterns, anomalies, and observations.
pub struct InsightsService {
    db: Arc<Database>,
    observation_generator: ObservationGenerator,
}

impl InsightsService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            observation_generator: ObservationGenerator::new(),
        }
    }

    /// Build the complete insights payload for a user.
    pub fn insights(&self, user_id: &str) -> Result<InsightsReport> {
        tracing::info!(user_id, "Generating insights");

        let data_age_days = self.data_age_days(user_id)?;
        let data_freshness = self.db.latest_sample_date(user_id)?;

        let status = determine_status(data_age_days);
        let feature_availability = feature_availability(data_age_days);
        let unlock_progress = unlock_progress(data_age_days);

        let current_metrics = self.current_metrics(user_id)?;

        let baselines = if data_age_days >= UNLOCK_BASELINES_7D {
            self.baseline_comparisons(user_id)?
        } else {
            BTreeMap::new()
        };

        let patterns = if data_age_days >= UNLOCK_PATTERNS {
            self.db.get_patterns(user_id)?
        } else {
            Vec::new()
        };

        let anomalies = if data_age_days >= UNLOCK_ANOMALY_DETECTION {
            AnomalyScanner::new(self.db.clone()).scan(user_id)?
        } else {
            Vec::new()
        };

        let observations = self.observation_generator.generate_observations(
            &current_metrics,
            &baselines,
            &patterns,
            &anomalies,
            data_age_days,
        );
        let suggestions =
            self.observation_generator
                .generate_suggestions(&baselines, &patterns, &anomalies);

        Ok(InsightsReport {
            user_id: user_id.to_string(),
            generated_at: Utc::now(),
            data_age_days,
            data_freshness,
            status,
            feature_availability,
            unlock_progress,
            current_metrics,
            baselines,
            patterns,
            anomalies,
            observations,
            suggestions,
        })
    }

    /// Days of data available, inclusive of the earliest day.
    fn data_age_days(&self, user_id: &str) -> Result<u32> {
        let Some(earliest) = self.db.earliest_sample_date(user_id)? else {
            return Ok(0);
        };
        let today = Utc::now().date_naive();
        let days = (today - earliest).num_days() + 1;
        Ok(days.max(0) as u32)
    }

    fn current_metrics(&self, user_id: &str) -> Result<CurrentMetrics> {
        let latest = |metric: Metric| -> Result<Option<f64>> {
            Ok(self
                .db
                .latest_sample(user_id, metric.as_str())?
                .map(|s| s.value))
        };
        Ok(CurrentMetrics {
            hrv: latest(Metric::HrvRmssd)?,
            sleep_score: latest(Metric::SleepScore)?,
            resting_hr: latest(Metric::RestingHr)?,
            training_load_ratio: latest(Metric::TrainingLoadRatio)?,
        })
    }

    fn baseline_comparisons(&self, user_id: &str) -> Result<BTreeMap<String, BaselineComparison>> {
        let mut comparisons = BTreeMap::new();
        for baseline in self.db.get_baselines(user_id)? {
            let current = self
                .db
                .latest_sample(user_id, baseline.metric.as_str())?
                .map(|s| s.value);

            let percent_of_baseline = match (current, baseline.mean_all) {
                (Some(current), Some(mean)) if mean != 0.0 => Some(current / mean * 100.0),
                _ => None,
            };

            comparisons.insert(
                baseline.metric.as_str().to_string(),
                BaselineComparison {
                    current,
                    baseline: baseline.mean_all,
                    baseline_7d: baseline.mean_7d,
                    baseline_30d: baseline.mean_30d,
                    percent_of_baseline,
                    trend: comparison_trend(&baseline),
                    status: baseline.status,
                },
            );
        }
        Ok(comparisons)
    }
}

/// Trend of the 7-day mean against the 30-day mean, 5% dead band.
fn comparison_trend(baseline: &Baseline) -> Option<TrendDirection> {
    let (mean_7d, mean_30d) = (baseline.mean_7d?, baseline.mean_30d?);
    if mean_30d == 0.0 {
        return None;
    }
    let diff_percent = (mean_7d - mean_30d) / mean_30d * 100.0;
    Some(if diff_percent > 5.0 {
        TrendDirection::Improving
    } else if diff_percent < -5.0 {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    })
}

fn determine_status(data_age_days: u32) -> InsightStatus {
    if data_age_days < UNLOCK_BASELINES_7D {
        InsightStatus::Unavailable
    } else if data_age_days < UNLOCK_BASELINES_30D {
        InsightStatus::Partial
    } else {
        InsightStatus::Ready
    }
}

fn feature_status(threshold: u32, data_age_days: u32) -> FeatureStatus {
    if data_age_days >= threshold {
        FeatureStatus {
            available: true,
            message: None,
            unlock_at_days: threshold,
        }
    } else {
        FeatureStatus {
            available: false,
            message: Some(format!("Unlocks in {} days", threshold - data_age_days)),
            unlock_at_days: threshold,
        }
    }
}

fn feature_availability(data_age_days: u32) -> FeatureAvailability {
    FeatureAvailability {
        baselines_7d: feature_status(UNLOCK_BASELINES_7D, data_age_days),
        baselines_30d: feature_status(UNLOCK_BASELINES_30D, data_age_days),
        patterns: feature_status(UNLOCK_PATTERNS, data_age_days),
        anomaly_detection: feature_status(UNLOCK_ANOMALY_DETECTION, data_age_days),
        ml_predictions: feature_status(UNLOCK_ML_PREDICTIONS, data_age_days),
    }
}

fn unlock_progress(data_age_days: u32) -> Option<UnlockProgress> {
    let mut unlocks = UNLOCKS;
    unlocks.sort_by_key(|&(_, threshold)| threshold);

    for (feature, threshold) in unlocks {
        if data_age_days < threshold {
            let percent = data_age_days as f64 / threshold as f64 * 100.0;
            return Some(UnlockProgress {
                next_unlock: feature.to_string(),
                days_until_next: threshold - data_age_days,
                percent_to_next: percent.min(99.9),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::baseline::BaselineEngine;
    use crate::analytics::pattern::PatternEngine;
    use crate::config::AnalyticsConfig;
    use crate::types::UserAccount;
    use chrono::Duration;

    fn db_with_user() -> Arc<Database> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        db.upsert_user(&UserAccount {
            user_id: "u1".to_string(),
            access_token: Some("t".to_string()),
            token_expires_at: None,
            is_active: true,
            last_synced_at: None,
            created_at: Utc::now(),
        })
        .unwrap();
        db
    }

    fn seed_days(db: &Database, metric: Metric, days: u32, base_value: f64) {
        let today = Utc::now().date_naive();
        for i in 0..days {
            db.upsert_metric_sample(
                "u1",
                metric.as_str(),
                today - Duration::days(i as i64),
                base_value + (i % 5) as f64,
            )
            .unwrap();
        }
    }

    #[test]
    fn test_five_days_is_unavailable_with_onboarding_observation() {
        let db = db_with_user();
        seed_days(&db, Metric::SleepScore, 5, 80.0);

        let report = InsightsService::new(db).insights("u1").unwrap();

        assert_eq!(report.status, InsightStatus::Unavailable);
        assert_eq!(report.data_age_days, 5);
        assert!(report.baselines.is_empty());
        assert!(report.patterns.is_empty());
        assert!(report.anomalies.is_empty());
        assert!(!report.observations.is_empty(), "onboarding observation expected");
        assert!(report.observations[0].fact.contains("5/7"));

        let progress = report.unlock_progress.unwrap();
        assert_eq!(progress.next_unlock, "baselines_7d");
        assert_eq!(progress.days_until_next, 2);
    }

    #[test]
    fn test_no_data_at_all() {
        let db = db_with_user();
        let report = InsightsService::new(db).insights("u1").unwrap();
        assert_eq!(report.data_age_days, 0);
        assert_eq!(report.status, InsightStatus::Unavailable);
        assert!(report.data_freshness.is_none());
    }

    #[test]
    fn test_partial_between_unlock_tiers() {
        let db = db_with_user();
        seed_days(&db, Metric::HrvRmssd, 14, 50.0);
        BaselineEngine::new(db.clone(), AnalyticsConfig::default())
            .compute_all("u1")
            .unwrap();

        let report = InsightsService::new(db).insights("u1").unwrap();

        assert_eq!(report.status, InsightStatus::Partial);
        assert!(report.feature_availability.baselines_7d.available);
        assert!(!report.feature_availability.patterns.available);
        assert!(!report.feature_availability.baselines_30d.available);
        // Baselines unlocked at 7 days
        assert!(report.baselines.contains_key(Metric::HrvRmssd.as_str()));
        // Patterns still gated
        assert!(report.patterns.is_empty());
    }

    #[test]
    fn test_ready_at_thirty_days() {
        let db = db_with_user();
        seed_days(&db, Metric::HrvRmssd, 35, 50.0);
        seed_days(&db, Metric::SleepScore, 35, 80.0);
        BaselineEngine::new(db.clone(), AnalyticsConfig::default())
            .compute_all("u1")
            .unwrap();
        PatternEngine::new(db.clone(), AnalyticsConfig::default())
            .detect_all("u1")
            .unwrap();

        let report = InsightsService::new(db).insights("u1").unwrap();

        assert_eq!(report.status, InsightStatus::Ready);
        assert!(report.feature_availability.baselines_30d.available);
        assert!(!report.feature_availability.ml_predictions.available);
        assert_eq!(report.patterns.len(), 4);
        assert!(report.current_metrics.hrv.is_some());

        // ml_predictions is the only remaining unlock
        let progress = report.unlock_progress.unwrap();
        assert_eq!(progress.next_unlock, "ml_predictions");
    }

    #[test]
    fn test_feature_status_messages() {
        let status = feature_status(21, 14);
        assert!(!status.available);
        assert_eq!(status.message.as_deref(), Some("Unlocks in 7 days"));

        let status = feature_status(7, 14);
        assert!(status.available);
        assert!(status.message.is_none());
    }

    #[test]
    fn test_comparison_trend_bands() {
        let mut baseline = Baseline {
            metric: Metric::HrvRmssd,
            mean_all: Some(50.0),
            mean_7d: Some(56.0),
            mean_30d: Some(50.0),
            mean_90d: None,
            median: None,
            q1: None,
            q3: None,
            std_dev: None,
            min_value: None,
            max_value: None,
            sample_count: 30,
            status: BaselineStatus::Ready,
            data_start_date: None,
            data_end_date: None,
            computed_at: Utc::now(),
        };
        assert_eq!(comparison_trend(&baseline), Some(TrendDirection::Improving));

        baseline.mean_7d = Some(46.0);
        assert_eq!(comparison_trend(&baseline), Some(TrendDirection::Declining));

        baseline.mean_7d = Some(51.0);
        assert_eq!(comparison_trend(&baseline), Some(TrendDirection::Stable));

        baseline.mean_30d = None;
        assert_eq!(comparison_trend(&baseline), None);
    }
}
