//! Pattern detection: correlations, trends, and composite risk scores.
//!
//! Correlations use Spearman rank correlation with a 21-sample minimum;
//! smaller samples produce statistically unreliable estimates and are
//! reported as insufficient rather than guessed at.

use crate::analytics::stats;
use crate::config::AnalyticsConfig;
use crate::db::Database;
use crate::error::Result;
use crate::types::{Metric, MetricSample, Pattern, PatternType, Significance, TrendDirection};
use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reliable Spearman estimates need n >= 21.
const MIN_SAMPLES_CORRELATION: usize = 21;
/// Minimum history for trend analysis.
const MIN_SAMPLES_TREND: usize = 7;
/// Minimum samples inside the recent 7-day window.
const MIN_RECENT_SAMPLES: usize = 3;

pub const PATTERN_SLEEP_HRV_CORRELATION: &str = "sleep_hrv_correlation";
pub const PATTERN_OVERTRAINING_RISK: &str = "overtraining_risk";
pub const PATTERN_HRV_TREND: &str = "hrv_trend";
pub const PATTERN_SLEEP_TREND: &str = "sleep_trend";

/// Detects patterns in a user's metric history and stores the snapshots.
pub struct PatternEngine {
    db: Arc<Database>,
    config: AnalyticsConfig,
}

impl PatternEngine {
    pub fn new(db: Arc<Database>, config: AnalyticsConfig) -> Self {
        Self { db, config }
    }

    /// Run every detector for a user, replacing stored snapshots.
    ///
    /// Returns pattern name -> significance.
    pub fn detect_all(&self, user_id: &str) -> Result<BTreeMap<String, Significance>> {
        tracing::info!(user_id, "Detecting all patterns");

        let mut results = BTreeMap::new();

        let correlation = self.detect_sleep_hrv_correlation(user_id)?;
        results.insert(correlation.name.clone(), correlation.significance);
        self.db.replace_pattern(user_id, &correlation)?;

        let overtraining = self.detect_overtraining_risk(user_id)?;
        results.insert(overtraining.name.clone(), overtraining.significance);
        self.db.replace_pattern(user_id, &overtraining)?;

        let hrv_trend = self.detect_trend(user_id, Metric::HrvRmssd, PATTERN_HRV_TREND)?;
        results.insert(hrv_trend.name.clone(), hrv_trend.significance);
        self.db.replace_pattern(user_id, &hrv_trend)?;

        let sleep_trend = self.detect_trend(user_id, Metric::SleepScore, PATTERN_SLEEP_TREND)?;
        results.insert(sleep_trend.name.clone(), sleep_trend.significance);
        self.db.replace_pattern(user_id, &sleep_trend)?;

        tracing::info!(user_id, ?results, "Pattern detection complete");
        Ok(results)
    }

    /// Correlation between sleep quality and HRV, aligned by date.
    pub fn detect_sleep_hrv_correlation(&self, user_id: &str) -> Result<Pattern> {
        let since = Utc::now().date_naive() - Duration::days(90);
        let sleep: BTreeMap<NaiveDate, f64> = self
            .db
            .get_series(user_id, Metric::SleepScore.as_str(), since)?
            .into_iter()
            .map(|s| (s.date, s.value))
            .collect();
        let hrv: BTreeMap<NaiveDate, f64> = self
            .db
            .get_series(user_id, Metric::HrvRmssd.as_str(), since)?
            .into_iter()
            .map(|s| (s.date, s.value))
            .collect();

        // Only days where both metrics exist count
        let mut sleep_values = Vec::new();
        let mut hrv_values = Vec::new();
        for (date, sleep_value) in &sleep {
            if let Some(hrv_value) = hrv.get(date) {
                sleep_values.push(*sleep_value);
                hrv_values.push(*hrv_value);
            }
        }
        let aligned = sleep_values.len();
        let metrics = vec![
            Metric::SleepScore.as_str().to_string(),
            Metric::HrvRmssd.as_str().to_string(),
        ];

        if aligned < MIN_SAMPLES_CORRELATION {
            return Ok(insufficient_pattern(
                PatternType::Correlation,
                PATTERN_SLEEP_HRV_CORRELATION,
                metrics,
                aligned,
                format!(
                    "insufficient data: {} aligned samples, need {}",
                    aligned, MIN_SAMPLES_CORRELATION
                ),
            ));
        }

        let Some((rho, p_value)) = stats::spearman(&sleep_values, &hrv_values) else {
            tracing::warn!(user_id, aligned, "Correlation undefined, data may lack variance");
            return Ok(insufficient_pattern(
                PatternType::Correlation,
                PATTERN_SLEEP_HRV_CORRELATION,
                metrics,
                aligned,
                "could not compute correlation - data may lack variance".to_string(),
            ));
        };

        let significance = if p_value < 0.01 {
            Significance::High
        } else if p_value < 0.05 {
            Significance::Medium
        } else if p_value < 0.1 {
            Significance::Low
        } else {
            Significance::Insufficient
        };

        let strength = match rho.abs() {
            a if a >= 0.7 => "strong",
            a if a >= 0.4 => "moderate",
            a if a >= 0.2 => "weak",
            _ => "negligible",
        };
        let direction = if rho > 0.0 { "positive" } else { "negative" };
        let mut interpretation = format!(
            "{} {} correlation between sleep quality and HRV",
            strength, direction
        );
        if rho > 0.3 && p_value < 0.05 {
            interpretation.push_str("; better sleep is associated with higher HRV");
        } else if rho < -0.3 && p_value < 0.05 {
            interpretation.push_str("; this inverse relationship may warrant investigation");
        }

        Ok(Pattern {
            pattern_type: PatternType::Correlation,
            name: PATTERN_SLEEP_HRV_CORRELATION.to_string(),
            metrics_involved: metrics,
            analysis_window_days: 90,
            score: Some(rho),
            confidence: Some(1.0 - p_value),
            significance,
            details: json!({
                "correlation_coefficient": rho,
                "p_value": p_value,
                "strength": strength,
                "direction": direction,
                "interpretation": interpretation,
            }),
            sample_count: aligned,
            analyzed_at: Utc::now(),
        })
    }

    /// 7-day mean of a metric against its prior 30-day baseline.
    pub fn detect_trend(&self, user_id: &str, metric: Metric, name: &str) -> Result<Pattern> {
        let metrics = vec![metric.as_str().to_string()];
        let Some(trend) = self.metric_trend(user_id, metric)? else {
            return Ok(insufficient_pattern(
                PatternType::Trend,
                name,
                metrics,
                0,
                "insufficient data for trend analysis".to_string(),
            ));
        };

        let significance = match trend.abs() {
            t if t >= 10.0 => Significance::High,
            t if t >= 5.0 => Significance::Medium,
            _ => Significance::Low,
        };

        let threshold = self.config.trend_threshold_percent;
        let direction = if trend > threshold {
            TrendDirection::Improving
        } else if trend < -threshold {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        };

        Ok(Pattern {
            pattern_type: PatternType::Trend,
            name: name.to_string(),
            metrics_involved: metrics,
            analysis_window_days: 30,
            score: Some(trend),
            confidence: Some(0.8),
            significance,
            details: json!({
                "trend_percent": trend,
                "direction": direction.as_str(),
                "interpretation": format!(
                    "{} is {} ({:+.1}% from baseline)",
                    metric.display_name(),
                    direction.as_str(),
                    trend
                ),
            }),
            sample_count: MIN_SAMPLES_TREND,
            analyzed_at: Utc::now(),
        })
    }

    /// Weighted multi-factor overtraining risk score, 0-100.
    ///
    /// The per-factor point values (25 full / 15 partial) are a preserved
    /// heuristic, tunable rather than derived.
    pub fn detect_overtraining_risk(&self, user_id: &str) -> Result<Pattern> {
        let mut risk_score = 0u32;
        let mut factors: Vec<String> = Vec::new();
        let mut metrics_checked = 0usize;

        if let Some(hrv_trend) = self.metric_trend(user_id, Metric::HrvRmssd)? {
            metrics_checked += 1;
            if hrv_trend < -10.0 {
                risk_score += 25;
                factors.push(format!("HRV declining significantly ({:.1}%)", hrv_trend));
            } else if hrv_trend < -5.0 {
                risk_score += 15;
                factors.push(format!("HRV declining moderately ({:.1}%)", hrv_trend));
            }
        }

        if let Some(sleep_trend) = self.metric_trend(user_id, Metric::SleepScore)? {
            metrics_checked += 1;
            if sleep_trend < -10.0 {
                risk_score += 25;
                factors.push(format!("Sleep quality declining ({:.1}%)", sleep_trend));
            } else if sleep_trend < -5.0 {
                risk_score += 15;
                factors.push(format!("Sleep quality declining slightly ({:.1}%)", sleep_trend));
            }
        }

        if let Some(rhr_trend) = self.metric_trend(user_id, Metric::RestingHr)? {
            metrics_checked += 1;
            if rhr_trend > 5.0 {
                risk_score += 25;
                factors.push(format!("Resting heart rate elevated ({:+.1}%)", rhr_trend));
            } else if rhr_trend > 2.0 {
                risk_score += 15;
                factors.push(format!(
                    "Resting heart rate slightly elevated ({:+.1}%)",
                    rhr_trend
                ));
            }
        }

        if let Some(load_ratio) = self.latest_positive(user_id, Metric::TrainingLoadRatio)? {
            metrics_checked += 1;
            if load_ratio > 1.5 {
                risk_score += 25;
                factors.push(format!("Training load ratio high ({:.2})", load_ratio));
            } else if load_ratio > 1.3 {
                risk_score += 15;
                factors.push(format!("Training load ratio elevated ({:.2})", load_ratio));
            }
        }

        let significance = if metrics_checked < 2 {
            Significance::Insufficient
        } else if risk_score >= 50 {
            Significance::High
        } else if risk_score >= 25 {
            Significance::Medium
        } else {
            Significance::Low
        };

        Ok(Pattern {
            pattern_type: PatternType::Composite,
            name: PATTERN_OVERTRAINING_RISK.to_string(),
            metrics_involved: vec![
                Metric::HrvRmssd.as_str().to_string(),
                Metric::SleepScore.as_str().to_string(),
                Metric::RestingHr.as_str().to_string(),
                Metric::TrainingLoadRatio.as_str().to_string(),
            ],
            analysis_window_days: 30,
            score: Some(risk_score as f64),
            confidence: if metrics_checked > 0 {
                Some(metrics_checked as f64 / 4.0)
            } else {
                Some(0.0)
            },
            significance,
            details: json!({
                "risk_score": risk_score,
                "risk_factors": factors,
                "metrics_checked": metrics_checked,
                "recommendations": recovery_recommendations(risk_score),
            }),
            sample_count: metrics_checked,
            analyzed_at: Utc::now(),
        })
    }

    /// Percent change of the last 7 days against the preceding baseline
    /// within a 30-day window. `None` when either side is too sparse.
    fn metric_trend(&self, user_id: &str, metric: Metric) -> Result<Option<f64>> {
        let today = Utc::now().date_naive();
        let series = self
            .db
            .get_series(user_id, metric.as_str(), today - Duration::days(30))?;

        if series.len() < MIN_SAMPLES_TREND {
            return Ok(None);
        }

        let recent_cutoff = today - Duration::days(7);
        let (recent, baseline): (Vec<&MetricSample>, Vec<&MetricSample>) =
            series.iter().partition(|s| s.date >= recent_cutoff);

        if recent.len() < MIN_RECENT_SAMPLES || baseline.len() < MIN_SAMPLES_TREND {
            return Ok(None);
        }

        let recent_avg = stats::mean(&recent.iter().map(|s| s.value).collect::<Vec<_>>());
        let baseline_avg = stats::mean(&baseline.iter().map(|s| s.value).collect::<Vec<_>>());
        match (recent_avg, baseline_avg) {
            (Some(recent_avg), Some(baseline_avg)) if baseline_avg != 0.0 => {
                Ok(Some((recent_avg - baseline_avg) / baseline_avg * 100.0))
            }
            _ => Ok(None),
        }
    }

    fn latest_positive(&self, user_id: &str, metric: Metric) -> Result<Option<f64>> {
        let latest = self.db.latest_sample(user_id, metric.as_str())?;
        Ok(latest.map(|s| s.value).filter(|&v| v > 0.0))
    }
}

fn insufficient_pattern(
    pattern_type: PatternType,
    name: &str,
    metrics_involved: Vec<String>,
    sample_count: usize,
    reason: String,
) -> Pattern {
    Pattern {
        pattern_type,
        name: name.to_string(),
        metrics_involved,
        analysis_window_days: if pattern_type == PatternType::Correlation {
            90
        } else {
            30
        },
        score: None,
        confidence: None,
        significance: Significance::Insufficient,
        details: json!({ "reason": reason }),
        sample_count,
        analyzed_at: Utc::now(),
    }
}

fn recovery_recommendations(risk_score: u32) -> Vec<&'static str> {
    if risk_score >= 75 {
        vec![
            "Consider taking a rest day or reducing training intensity significantly",
            "Prioritize sleep quality and duration",
            "Monitor for overtraining symptoms such as fatigue or mood changes",
        ]
    } else if risk_score >= 50 {
        vec![
            "Reduce training intensity for the next few days",
            "Focus on recovery activities such as light stretching or walking",
            "Ensure adequate sleep (7-9 hours)",
        ]
    } else if risk_score >= 25 {
        vec![
            "Monitor your body's response to training",
            "Consider adding an extra recovery day this week",
        ]
    } else {
        vec![
            "Training load appears manageable",
            "Continue current training while monitoring recovery metrics",
        ]
    }
}
