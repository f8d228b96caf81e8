//! Deterministic natural-language observations over analytics output.
//!
//! Converts numeric baselines, patterns, and anomalies into short factual
//! statements a downstream coaching layer can surface directly. Every rule
//! is a fixed threshold over already-computed values; nothing here is
//! generative.

use crate::analytics::insights::{BaselineComparison, CurrentMetrics};
use crate::analytics::pattern::{PATTERN_OVERTRAINING_RISK, PATTERN_SLEEP_HRV_CORRELATION};
use crate::types::{Anomaly, Metric, Pattern, Severity, Significance, TrendDirection};
use serde::Serialize;
use std::collections::BTreeMap;

/// Observation grouping for the consuming layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationCategory {
    Onboarding,
    Anomaly,
    Recovery,
    Sleep,
    Training,
}

/// Display priority, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationPriority {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Positive,
}

impl ObservationPriority {
    fn rank(&self) -> u8 {
        match self {
            ObservationPriority::Critical => 0,
            ObservationPriority::High => 1,
            ObservationPriority::Medium => 2,
            ObservationPriority::Low => 3,
            ObservationPriority::Info => 4,
            ObservationPriority::Positive => 5,
        }
    }
}

/// One factual statement with supporting context.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub category: ObservationCategory,
    pub priority: ObservationPriority,
    pub fact: String,
    pub context: Option<String>,
    pub trend: Option<TrendDirection>,
}

/// One actionable suggestion derived from the same inputs.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub action: &'static str,
    pub description: &'static str,
    pub confidence: f64,
    pub reason: String,
}

/// Generates observations and suggestions from analytics data.
#[derive(Default)]
pub struct ObservationGenerator;

impl ObservationGenerator {
    pub fn new() -> Self {
        Self
    }

    /// All observations, sorted by priority.
    pub fn generate_observations(
        &self,
        current_metrics: &CurrentMetrics,
        baselines: &BTreeMap<String, BaselineComparison>,
        patterns: &[Pattern],
        anomalies: &[Anomaly],
        data_age_days: u32,
    ) -> Vec<Observation> {
        let mut observations = Vec::new();

        if data_age_days < 7 {
            observations.push(Observation {
                category: ObservationCategory::Onboarding,
                priority: ObservationPriority::Info,
                fact: format!("Building your personal baselines ({}/7 days)", data_age_days),
                context: Some(format!(
                    "Keep wearing your device. Basic insights unlock in {} days.",
                    7 - data_age_days
                )),
                trend: None,
            });
        } else if data_age_days < 21 {
            observations.push(Observation {
                category: ObservationCategory::Onboarding,
                priority: ObservationPriority::Info,
                fact: format!(
                    "Your baselines are being established ({} days of data)",
                    data_age_days
                ),
                context: Some(format!(
                    "Pattern detection unlocks in {} days. Accuracy improves over time.",
                    21u32.saturating_sub(data_age_days)
                )),
                trend: None,
            });
        }

        for anomaly in anomalies {
            observations.push(self.anomaly_observation(anomaly));
        }

        if let Some(comparison) = baselines.get(Metric::HrvRmssd.as_str()) {
            if let Some(obs) = self.hrv_observation(comparison, current_metrics.hrv) {
                observations.push(obs);
            }
        }

        if let Some(comparison) = baselines.get(Metric::SleepScore.as_str()) {
            if let Some(obs) = self.sleep_observation(comparison, current_metrics.sleep_score) {
                observations.push(obs);
            }
        }

        for pattern in patterns {
            if let Some(obs) = self.pattern_observation(pattern) {
                observations.push(obs);
            }
        }

        observations.sort_by_key(|o| o.priority.rank());
        observations
    }

    /// Actionable suggestions; at most one per concern.
    pub fn generate_suggestions(
        &self,
        baselines: &BTreeMap<String, BaselineComparison>,
        patterns: &[Pattern],
        anomalies: &[Anomaly],
    ) -> Vec<Suggestion> {
        let mut suggestions = Vec::new();

        let overtraining = patterns
            .iter()
            .find(|p| p.name == PATTERN_OVERTRAINING_RISK)
            .and_then(|p| p.score);
        if let Some(score) = overtraining {
            if score >= 50.0 {
                suggestions.push(Suggestion {
                    action: "rest_day",
                    description: "Take a rest day or do light recovery activity",
                    confidence: (score / 100.0).min(0.95),
                    reason: "Elevated overtraining risk score indicates need for recovery"
                        .to_string(),
                });
            } else if score >= 25.0 {
                suggestions.push(Suggestion {
                    action: "reduce_intensity",
                    description: "Consider reducing training intensity",
                    confidence: (score / 100.0).min(0.8),
                    reason: "Moderate overtraining risk detected".to_string(),
                });
            }
        }

        let hrv = baselines.get(Metric::HrvRmssd.as_str());
        if let Some(pct) = hrv.and_then(|b| b.percent_of_baseline) {
            if pct < 85.0 {
                suggestions.push(Suggestion {
                    action: "prioritize_recovery",
                    description: "Prioritize sleep and recovery today",
                    confidence: 0.85,
                    reason: format!("HRV is {:.0}% below baseline", 100.0 - pct),
                });
            }
        }

        if let Some(critical) = anomalies.iter().find(|a| a.severity == Severity::Critical) {
            suggestions.push(Suggestion {
                action: "monitor_closely",
                description: "Monitor your metrics closely today",
                confidence: 0.9,
                reason: format!("Critical anomaly detected in {}", critical.metric),
            });
        }

        if suggestions.is_empty() {
            if let Some(pct) = hrv.and_then(|b| b.percent_of_baseline) {
                if pct >= 100.0 {
                    suggestions.push(Suggestion {
                        action: "train_normally",
                        description: "Body is well-recovered, train as planned",
                        confidence: 0.85,
                        reason: "HRV at or above baseline indicates good recovery".to_string(),
                    });
                }
            }
        }

        suggestions
    }

    fn anomaly_observation(&self, anomaly: &Anomaly) -> Observation {
        let metric_display = anomaly.metric.display_name();
        let (priority, fact) = match anomaly.severity {
            Severity::Critical => (
                ObservationPriority::Critical,
                format!(
                    "{} is significantly {} normal range",
                    metric_display,
                    anomaly.direction.as_str()
                ),
            ),
            Severity::Warning => (
                ObservationPriority::High,
                format!(
                    "{} is {} normal range",
                    metric_display,
                    anomaly.direction.as_str()
                ),
            ),
        };

        let context = match anomaly.deviation_percent {
            Some(deviation) => format!(
                "Current: {:.1}, Baseline: {:.1} ({:+.0}%)",
                anomaly.current_value, anomaly.baseline_value, deviation
            ),
            None => format!(
                "Current: {:.1}, Baseline: {:.1}",
                anomaly.current_value, anomaly.baseline_value
            ),
        };

        Observation {
            category: ObservationCategory::Anomaly,
            priority,
            fact,
            context: Some(context),
            trend: None,
        }
    }

    fn hrv_observation(
        &self,
        comparison: &BaselineComparison,
        current_hrv: Option<f64>,
    ) -> Option<Observation> {
        let pct = comparison.percent_of_baseline?;

        if pct < 85.0 {
            let context = match (current_hrv, comparison.baseline) {
                (Some(current), Some(baseline)) => {
                    Some(format!("Current: {:.0}ms, Baseline: {:.0}ms", current, baseline))
                }
                _ => None,
            };
            return Some(Observation {
                category: ObservationCategory::Recovery,
                priority: ObservationPriority::High,
                fact: format!("HRV is {:.0}% below personal baseline", 100.0 - pct),
                context,
                trend: comparison.trend,
            });
        }
        if pct > 110.0 {
            return Some(Observation {
                category: ObservationCategory::Recovery,
                priority: ObservationPriority::Positive,
                fact: format!("HRV is {:.0}% above baseline - excellent recovery", pct - 100.0),
                context: Some("Body is well-recovered and ready for training".to_string()),
                trend: Some(TrendDirection::Improving),
            });
        }
        None
    }

    fn sleep_observation(
        &self,
        comparison: &BaselineComparison,
        current_score: Option<f64>,
    ) -> Option<Observation> {
        let pct = comparison.percent_of_baseline?;

        if comparison.trend == Some(TrendDirection::Declining) {
            return Some(Observation {
                category: ObservationCategory::Sleep,
                priority: ObservationPriority::Medium,
                fact: "Sleep quality has been declining against your baseline".to_string(),
                context: current_score.map(|s| format!("Current score: {:.0}", s)),
                trend: Some(TrendDirection::Declining),
            });
        }

        if pct < 85.0 {
            let context = match (current_score, comparison.baseline) {
                (Some(current), Some(baseline)) => {
                    Some(format!("Current: {:.0}, Baseline: {:.0}", current, baseline))
                }
                _ => None,
            };
            return Some(Observation {
                category: ObservationCategory::Sleep,
                priority: ObservationPriority::Medium,
                fact: format!("Sleep score is {:.0}% below your average", 100.0 - pct),
                context,
                trend: comparison.trend,
            });
        }

        None
    }

    fn pattern_observation(&self, pattern: &Pattern) -> Option<Observation> {
        if pattern.significance == Significance::Insufficient {
            return None;
        }

        if pattern.name == PATTERN_OVERTRAINING_RISK {
            let score = pattern.score?;
            let factors = pattern.details["risk_factors"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(|f| f.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .filter(|s| !s.is_empty());

            if score >= 50.0 {
                return Some(Observation {
                    category: ObservationCategory::Training,
                    priority: ObservationPriority::High,
                    fact: format!("Overtraining risk is elevated ({:.0}/100)", score),
                    context: factors,
                    trend: Some(TrendDirection::Declining),
                });
            }
            if score >= 25.0 {
                return Some(Observation {
                    category: ObservationCategory::Training,
                    priority: ObservationPriority::Medium,
                    fact: format!("Moderate overtraining indicators detected ({:.0}/100)", score),
                    context: factors,
                    trend: Some(TrendDirection::Stable),
                });
            }
        }

        if pattern.name == PATTERN_SLEEP_HRV_CORRELATION
            && pattern.significance == Significance::High
            && pattern.score.map_or(false, |s| s > 0.5)
        {
            return Some(Observation {
                category: ObservationCategory::Recovery,
                priority: ObservationPriority::Info,
                fact: "Strong connection between your sleep quality and HRV detected".to_string(),
                context: Some("Better sleep directly improves your recovery metrics".to_string()),
                trend: None,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaselineStatus, Direction, PatternType};
    use chrono::Utc;
    use serde_json::json;

    fn generator() -> ObservationGenerator {
        ObservationGenerator::new()
    }

    fn empty_metrics() -> CurrentMetrics {
        CurrentMetrics {
            hrv: None,
            sleep_score: None,
            resting_hr: None,
            training_load_ratio: None,
        }
    }

    fn comparison(pct: Option<f64>, trend: Option<TrendDirection>) -> BaselineComparison {
        BaselineComparison {
            current: None,
            baseline: Some(50.0),
            baseline_7d: None,
            baseline_30d: None,
            percent_of_baseline: pct,
            trend,
            status: BaselineStatus::Ready,
        }
    }

    fn anomaly(severity: Severity) -> Anomaly {
        Anomaly {
            metric: Metric::HrvRmssd,
            current_value: 20.0,
            baseline_value: 50.0,
            median: Some(50.0),
            lower_bound: 40.0,
            upper_bound: 60.0,
            direction: Direction::Below,
            severity,
            deviation_percent: Some(-60.0),
        }
    }

    #[test]
    fn test_onboarding_observation_below_seven_days() {
        let observations = generator().generate_observations(
            &empty_metrics(),
            &BTreeMap::new(),
            &[],
            &[],
            5,
        );
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].category, ObservationCategory::Onboarding);
        assert!(observations[0].fact.contains("5/7"));
    }

    #[test]
    fn test_building_observation_below_twentyone_days() {
        let observations = generator().generate_observations(
            &empty_metrics(),
            &BTreeMap::new(),
            &[],
            &[],
            14,
        );
        assert_eq!(observations.len(), 1);
        assert!(observations[0].fact.contains("14 days"));
    }

    #[test]
    fn test_anomalies_sort_above_info() {
        let observations = generator().generate_observations(
            &empty_metrics(),
            &BTreeMap::new(),
            &[],
            &[anomaly(Severity::Critical)],
            10,
        );
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].priority, ObservationPriority::Critical);
        assert_eq!(observations[0].category, ObservationCategory::Anomaly);
        assert!(observations[0].fact.contains("significantly below"));
    }

    #[test]
    fn test_hrv_below_baseline_is_high_priority() {
        let mut baselines = BTreeMap::new();
        baselines.insert(Metric::HrvRmssd.as_str().to_string(), comparison(Some(80.0), None));

        let observations =
            generator().generate_observations(&empty_metrics(), &baselines, &[], &[], 30);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].priority, ObservationPriority::High);
        assert!(observations[0].fact.contains("20% below"));
    }

    #[test]
    fn test_hrv_above_baseline_is_positive() {
        let mut baselines = BTreeMap::new();
        baselines.insert(Metric::HrvRmssd.as_str().to_string(), comparison(Some(115.0), None));

        let observations =
            generator().generate_observations(&empty_metrics(), &baselines, &[], &[], 30);
        assert_eq!(observations[0].priority, ObservationPriority::Positive);
    }

    #[test]
    fn test_overtraining_pattern_observation() {
        let pattern = Pattern {
            pattern_type: PatternType::Composite,
            name: PATTERN_OVERTRAINING_RISK.to_string(),
            metrics_involved: vec![],
            analysis_window_days: 30,
            score: Some(65.0),
            confidence: Some(1.0),
            significance: Significance::High,
            details: json!({ "risk_factors": ["HRV declining significantly (-12.0%)"] }),
            sample_count: 4,
            analyzed_at: Utc::now(),
        };

        let observations = generator().generate_observations(
            &empty_metrics(),
            &BTreeMap::new(),
            &[pattern],
            &[],
            30,
        );
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].priority, ObservationPriority::High);
        assert!(observations[0].context.as_ref().unwrap().contains("HRV declining"));
    }

    #[test]
    fn test_suggestions_for_low_hrv_and_critical_anomaly() {
        let mut baselines = BTreeMap::new();
        baselines.insert(Metric::HrvRmssd.as_str().to_string(), comparison(Some(75.0), None));

        let suggestions =
            generator().generate_suggestions(&baselines, &[], &[anomaly(Severity::Critical)]);
        let actions: Vec<&str> = suggestions.iter().map(|s| s.action).collect();
        assert!(actions.contains(&"prioritize_recovery"));
        assert!(actions.contains(&"monitor_closely"));
    }

    #[test]
    fn test_train_normally_when_all_clear() {
        let mut baselines = BTreeMap::new();
        baselines.insert(Metric::HrvRmssd.as_str().to_string(), comparison(Some(105.0), None));

        let suggestions = generator().generate_suggestions(&baselines, &[], &[]);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].action, "train_normally");
    }
}
