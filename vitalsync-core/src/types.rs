//! Shared domain types for sync orchestration and analytics.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================
// Upstream endpoints
// ============================================

/// Upstream data endpoints, one fetch per endpoint per sync attempt.
///
/// Each endpoint is independent: a failure on one never blocks the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Sleep,
    Recharge,
    Activity,
    Exercises,
    CardioLoad,
    SleepwiseAlertness,
    SleepwiseBedtime,
    ActivitySamples,
    ContinuousHr,
    Spo2,
    Ecg,
    BodyTemperature,
    SkinTemperature,
}

impl Endpoint {
    /// All endpoints, in fetch order.
    pub const ALL: [Endpoint; 13] = [
        Endpoint::Sleep,
        Endpoint::Recharge,
        Endpoint::Activity,
        Endpoint::Exercises,
        Endpoint::CardioLoad,
        Endpoint::SleepwiseAlertness,
        Endpoint::SleepwiseBedtime,
        Endpoint::ActivitySamples,
        Endpoint::ContinuousHr,
        Endpoint::Spo2,
        Endpoint::Ecg,
        Endpoint::BodyTemperature,
        Endpoint::SkinTemperature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Sleep => "sleep",
            Endpoint::Recharge => "recharge",
            Endpoint::Activity => "activity",
            Endpoint::Exercises => "exercises",
            Endpoint::CardioLoad => "cardio_load",
            Endpoint::SleepwiseAlertness => "sleepwise_alertness",
            Endpoint::SleepwiseBedtime => "sleepwise_bedtime",
            Endpoint::ActivitySamples => "activity_samples",
            Endpoint::ContinuousHr => "continuous_hr",
            Endpoint::Spo2 => "spo2",
            Endpoint::Ecg => "ecg",
            Endpoint::BodyTemperature => "body_temperature",
            Endpoint::SkinTemperature => "skin_temperature",
        }
    }

    /// URL path segment on the provider API.
    pub fn api_path(&self) -> &'static str {
        match self {
            Endpoint::Sleep => "sleep",
            Endpoint::Recharge => "nightly-recharge",
            Endpoint::Activity => "daily-activity",
            Endpoint::Exercises => "exercises",
            Endpoint::CardioLoad => "cardio-load",
            Endpoint::SleepwiseAlertness => "sleepwise/alertness",
            Endpoint::SleepwiseBedtime => "sleepwise/bedtime",
            Endpoint::ActivitySamples => "activity-samples",
            Endpoint::ContinuousHr => "continuous-heart-rate",
            Endpoint::Spo2 => "biosensing/spo2",
            Endpoint::Ecg => "biosensing/ecg",
            Endpoint::BodyTemperature => "biosensing/body-temperature",
            Endpoint::SkinTemperature => "biosensing/skin-temperature",
        }
    }

    pub fn from_storage(value: &str) -> Option<Self> {
        Endpoint::ALL.iter().copied().find(|e| e.as_str() == value)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Metrics
// ============================================

/// The closed set of metrics the analytics engines compute baselines for.
///
/// Endpoints store more series than these (spo2, temperatures, ...), but
/// baseline, pattern, and anomaly calculations only ever dispatch over this
/// enum - never over free-form metric name strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    HrvRmssd,
    SleepScore,
    RestingHr,
    TrainingLoad,
    TrainingLoadRatio,
}

impl Metric {
    /// Metrics that get a personal baseline, in computation order.
    pub const BASELINE_SET: [Metric; 5] = [
        Metric::HrvRmssd,
        Metric::SleepScore,
        Metric::RestingHr,
        Metric::TrainingLoad,
        Metric::TrainingLoadRatio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::HrvRmssd => "hrv_rmssd",
            Metric::SleepScore => "sleep_score",
            Metric::RestingHr => "resting_hr",
            Metric::TrainingLoad => "training_load",
            Metric::TrainingLoadRatio => "training_load_ratio",
        }
    }

    pub fn from_storage(value: &str) -> Option<Self> {
        Metric::BASELINE_SET
            .iter()
            .copied()
            .find(|m| m.as_str() == value)
    }

    /// Human-readable label used in observations.
    pub fn display_name(&self) -> &'static str {
        match self {
            Metric::HrvRmssd => "HRV",
            Metric::SleepScore => "Sleep score",
            Metric::RestingHr => "Resting heart rate",
            Metric::TrainingLoad => "Training load",
            Metric::TrainingLoadRatio => "Training load ratio",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of a metric on a calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub date: NaiveDate,
    pub value: f64,
}

// ============================================
// Users
// ============================================

/// A user account as the sync engine sees it.
///
/// Identity and token lifecycle are owned elsewhere; the engine reads the
/// token, its expiry, and the last-successful-sync fact.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub user_id: String,
    pub access_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Dormant accounts drop to the lowest scheduling priority.
    pub is_active: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Sync lifecycle
// ============================================

/// What initiated a sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Automatic sync from the background scheduler
    Scheduler,
    /// Operator triggered via CLI
    Manual,
    /// Triggered through the external API surface
    Api,
    /// Initial sync on daemon startup
    Startup,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Scheduler => "scheduler",
            SyncTrigger::Manual => "manual",
            SyncTrigger::Api => "api",
            SyncTrigger::Startup => "startup",
        }
    }

    pub fn from_storage(value: &str) -> Self {
        match value {
            "scheduler" => SyncTrigger::Scheduler,
            "api" => SyncTrigger::Api,
            "startup" => SyncTrigger::Startup,
            _ => SyncTrigger::Manual,
        }
    }
}

/// Scheduling priority, recomputed from observable state on every pass.
///
/// Ordered so that `Critical > High > Normal > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl SyncPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPriority::Critical => "critical",
            SyncPriority::High => "high",
            SyncPriority::Normal => "normal",
            SyncPriority::Low => "low",
        }
    }

    pub fn from_storage(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(SyncPriority::Critical),
            "high" => Some(SyncPriority::High),
            "normal" => Some(SyncPriority::Normal),
            "low" => Some(SyncPriority::Low),
            _ => None,
        }
    }
}

/// Outcome of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Every endpoint succeeded
    Success,
    /// At least one endpoint succeeded and at least one failed
    Partial,
    /// No endpoint succeeded, or a fatal pre-flight error
    Failed,
    /// Sync was not attempted (user already in flight)
    Skipped,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
            SyncStatus::Skipped => "skipped",
        }
    }

    pub fn from_storage(value: &str) -> Self {
        match value {
            "success" => SyncStatus::Success,
            "partial" => SyncStatus::Partial,
            "skipped" => SyncStatus::Skipped,
            _ => SyncStatus::Failed,
        }
    }
}

/// Categorized error types driving retry and escalation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorType {
    // Authentication
    TokenExpired,
    TokenInvalid,
    TokenRevoked,
    // Rate limiting
    RateLimitedShort,
    RateLimitedLong,
    // Upstream availability
    ApiUnavailable,
    ApiTimeout,
    ApiError,
    // Data errors
    InvalidResponse,
    TransformError,
    // Internal
    DatabaseError,
    InternalError,
}

impl SyncErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorType::TokenExpired => "token_expired",
            SyncErrorType::TokenInvalid => "token_invalid",
            SyncErrorType::TokenRevoked => "token_revoked",
            SyncErrorType::RateLimitedShort => "rate_limited_short",
            SyncErrorType::RateLimitedLong => "rate_limited_long",
            SyncErrorType::ApiUnavailable => "api_unavailable",
            SyncErrorType::ApiTimeout => "api_timeout",
            SyncErrorType::ApiError => "api_error",
            SyncErrorType::InvalidResponse => "invalid_response",
            SyncErrorType::TransformError => "transform_error",
            SyncErrorType::DatabaseError => "database_error",
            SyncErrorType::InternalError => "internal_error",
        }
    }

    pub fn from_storage(value: &str) -> Option<Self> {
        match value {
            "token_expired" => Some(SyncErrorType::TokenExpired),
            "token_invalid" => Some(SyncErrorType::TokenInvalid),
            "token_revoked" => Some(SyncErrorType::TokenRevoked),
            "rate_limited_short" => Some(SyncErrorType::RateLimitedShort),
            "rate_limited_long" => Some(SyncErrorType::RateLimitedLong),
            "api_unavailable" => Some(SyncErrorType::ApiUnavailable),
            "api_timeout" => Some(SyncErrorType::ApiTimeout),
            "api_error" => Some(SyncErrorType::ApiError),
            "invalid_response" => Some(SyncErrorType::InvalidResponse),
            "transform_error" => Some(SyncErrorType::TransformError),
            "database_error" => Some(SyncErrorType::DatabaseError),
            "internal_error" => Some(SyncErrorType::InternalError),
            _ => None,
        }
    }

    /// Whether the next scheduled pass may retry this endpoint automatically.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncErrorType::TokenExpired
                | SyncErrorType::RateLimitedShort
                | SyncErrorType::RateLimitedLong
                | SyncErrorType::ApiUnavailable
                | SyncErrorType::ApiTimeout
                | SyncErrorType::DatabaseError
                | SyncErrorType::InternalError
        )
    }

    /// Default wait before an automatic retry, `None` for errors that
    /// require user action or investigation.
    pub fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            SyncErrorType::TokenExpired => Some(0),
            SyncErrorType::RateLimitedShort => Some(900),
            SyncErrorType::RateLimitedLong => Some(86_400),
            SyncErrorType::ApiUnavailable => Some(300),
            SyncErrorType::ApiTimeout => Some(60),
            SyncErrorType::DatabaseError => Some(60),
            SyncErrorType::InternalError => Some(300),
            SyncErrorType::TokenInvalid
            | SyncErrorType::TokenRevoked
            | SyncErrorType::ApiError
            | SyncErrorType::InvalidResponse
            | SyncErrorType::TransformError => None,
        }
    }
}

impl fmt::Display for SyncErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified endpoint failure inside a sync attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointError {
    pub error_type: SyncErrorType,
    pub message: String,
}

/// Per-endpoint outcome of one sync attempt.
///
/// Produced by the sync executor, persisted as a `sync_logs` row, and
/// returned to whoever triggered the sync.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub user_id: String,
    /// UUID correlating log lines across the attempt
    pub job_id: String,
    pub trigger: SyncTrigger,
    pub priority: Option<SyncPriority>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Records upserted per endpoint that completed without error
    pub endpoint_counts: BTreeMap<Endpoint, u32>,
    /// Classified failure per endpoint that errored
    pub endpoint_errors: BTreeMap<Endpoint, EndpointError>,
    pub api_calls_made: u32,
    /// Set when the sync was skipped or failed before any endpoint ran
    pub fatal_error: Option<EndpointError>,
    pub skipped: bool,
}

impl SyncReport {
    /// Derive the overall status from per-endpoint outcomes.
    ///
    /// `success` iff no endpoint errored, `partial` iff at least one
    /// endpoint succeeded and at least one failed, `failed` otherwise.
    pub fn status(&self) -> SyncStatus {
        if self.skipped {
            return SyncStatus::Skipped;
        }
        if self.fatal_error.is_some() && self.endpoint_counts.is_empty() {
            return SyncStatus::Failed;
        }
        if self.endpoint_errors.is_empty() {
            SyncStatus::Success
        } else if self.endpoint_counts.is_empty() {
            SyncStatus::Failed
        } else {
            SyncStatus::Partial
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.completed_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// Total records upserted across all endpoints.
    pub fn total_records(&self) -> u64 {
        self.endpoint_counts.values().map(|&c| c as u64).sum()
    }

    /// The error to surface at the sync level, if any.
    pub fn primary_error(&self) -> Option<&EndpointError> {
        self.fatal_error
            .as_ref()
            .or_else(|| self.endpoint_errors.values().next())
    }
}

/// A persisted audit row for one sync attempt. Immutable after write except
/// for the analytics-completion flags.
#[derive(Debug, Clone)]
pub struct SyncLogEntry {
    pub id: i64,
    pub user_id: String,
    pub job_id: String,
    pub trigger: SyncTrigger,
    pub priority: Option<SyncPriority>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: SyncStatus,
    pub error_type: Option<SyncErrorType>,
    pub error_message: Option<String>,
    pub records_synced: BTreeMap<String, u32>,
    pub endpoint_errors: BTreeMap<String, EndpointError>,
    pub api_calls_made: u32,
    pub baselines_recalculated: bool,
    pub patterns_detected: bool,
}

// ============================================
// Analytics
// ============================================

/// Status of a baseline calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineStatus {
    /// 21+ samples
    Ready,
    /// 7-20 samples
    Partial,
    /// Fewer than 7 samples
    Insufficient,
}

impl BaselineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineStatus::Ready => "ready",
            BaselineStatus::Partial => "partial",
            BaselineStatus::Insufficient => "insufficient",
        }
    }

    pub fn from_storage(value: &str) -> Self {
        match value {
            "ready" => BaselineStatus::Ready,
            "partial" => BaselineStatus::Partial,
            _ => BaselineStatus::Insufficient,
        }
    }
}

/// A personal statistical reference snapshot for one metric.
///
/// Recomputed wholesale from history on each trigger; a new snapshot fully
/// replaces the previous one for the same (user, metric) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub metric: Metric,
    pub mean_all: Option<f64>,
    pub mean_7d: Option<f64>,
    pub mean_30d: Option<f64>,
    pub mean_90d: Option<f64>,
    pub median: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub std_dev: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub sample_count: usize,
    pub status: BaselineStatus,
    pub data_start_date: Option<NaiveDate>,
    pub data_end_date: Option<NaiveDate>,
    pub computed_at: DateTime<Utc>,
}

impl Baseline {
    /// Interquartile range (Q3 - Q1).
    pub fn iqr(&self) -> Option<f64> {
        match (self.q1, self.q3) {
            (Some(q1), Some(q3)) => Some(q3 - q1),
            _ => None,
        }
    }

    /// Warning-level bounds: [Q1 - 1.5*IQR, Q3 + 1.5*IQR].
    pub fn warning_bounds(&self) -> Option<(f64, f64)> {
        let iqr = self.iqr()?;
        Some((self.q1? - 1.5 * iqr, self.q3? + 1.5 * iqr))
    }

    /// Critical-level bounds: [Q1 - 3*IQR, Q3 + 3*IQR].
    pub fn critical_bounds(&self) -> Option<(f64, f64)> {
        let iqr = self.iqr()?;
        Some((self.q1? - 3.0 * iqr, self.q3? + 3.0 * iqr))
    }

    /// Classify a value against the IQR bounds.
    ///
    /// Returns `None` when the value is inside the warning bounds or the
    /// baseline has no quartiles.
    pub fn classify(&self, value: f64) -> Option<Severity> {
        let (warn_lo, warn_hi) = self.warning_bounds()?;
        let (crit_lo, crit_hi) = self.critical_bounds()?;
        if value < crit_lo || value > crit_hi {
            Some(Severity::Critical)
        } else if value < warn_lo || value > warn_hi {
            Some(Severity::Warning)
        } else {
            None
        }
    }
}

/// Kinds of detected patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Correlation,
    Trend,
    Composite,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Correlation => "correlation",
            PatternType::Trend => "trend",
            PatternType::Composite => "composite",
        }
    }

    pub fn from_storage(value: &str) -> Option<Self> {
        match value {
            "correlation" => Some(PatternType::Correlation),
            "trend" => Some(PatternType::Trend),
            "composite" => Some(PatternType::Composite),
            _ => None,
        }
    }
}

/// Statistical significance levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    High,
    Medium,
    Low,
    Insufficient,
}

impl Significance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Significance::High => "high",
            Significance::Medium => "medium",
            Significance::Low => "low",
            Significance::Insufficient => "insufficient",
        }
    }

    pub fn from_storage(value: &str) -> Self {
        match value {
            "high" => Significance::High,
            "medium" => Significance::Medium,
            "low" => Significance::Low,
            _ => Significance::Insufficient,
        }
    }
}

/// A detected relationship among metrics, replaced wholesale per
/// (user, pattern_name) on each detection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_type: PatternType,
    pub name: String,
    pub metrics_involved: Vec<String>,
    pub analysis_window_days: u32,
    pub score: Option<f64>,
    pub confidence: Option<f64>,
    pub significance: Significance,
    pub details: serde_json::Value,
    pub sample_count: usize,
    pub analyzed_at: DateTime<Utc>,
}

/// Direction of a trend relative to baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Stable => "stable",
            TrendDirection::Declining => "declining",
        }
    }
}

/// Anomaly severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Which side of the baseline the anomalous value sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }
}

/// A metric value outside its personal baseline bounds. Derived on demand,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric: Metric,
    pub current_value: f64,
    pub baseline_value: f64,
    pub median: Option<f64>,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub direction: Direction,
    pub severity: Severity,
    pub deviation_percent: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(
        counts: &[(Endpoint, u32)],
        errors: &[(Endpoint, SyncErrorType)],
    ) -> SyncReport {
        let now = Utc::now();
        SyncReport {
            user_id: "u1".to_string(),
            job_id: "job".to_string(),
            trigger: SyncTrigger::Manual,
            priority: None,
            started_at: now,
            completed_at: now,
            endpoint_counts: counts.iter().map(|&(e, c)| (e, c)).collect(),
            endpoint_errors: errors
                .iter()
                .map(|&(e, t)| {
                    (
                        e,
                        EndpointError {
                            error_type: t,
                            message: "boom".to_string(),
                        },
                    )
                })
                .collect(),
            api_calls_made: 0,
            fatal_error: None,
            skipped: false,
        }
    }

    #[test]
    fn test_status_success_iff_no_errors() {
        let report = report_with(&[(Endpoint::Sleep, 5), (Endpoint::Recharge, 3)], &[]);
        assert_eq!(report.status(), SyncStatus::Success);
    }

    #[test]
    fn test_status_partial_with_mixed_outcomes() {
        let report = report_with(
            &[(Endpoint::Recharge, 3)],
            &[(Endpoint::Sleep, SyncErrorType::TokenRevoked)],
        );
        assert_eq!(report.status(), SyncStatus::Partial);
    }

    #[test]
    fn test_status_failed_when_all_endpoints_error() {
        let report = report_with(
            &[],
            &[
                (Endpoint::Sleep, SyncErrorType::ApiUnavailable),
                (Endpoint::Recharge, SyncErrorType::ApiUnavailable),
            ],
        );
        assert_eq!(report.status(), SyncStatus::Failed);
    }

    #[test]
    fn test_status_failed_on_preflight_fatal() {
        let mut report = report_with(&[], &[]);
        report.fatal_error = Some(EndpointError {
            error_type: SyncErrorType::TokenExpired,
            message: "expired".to_string(),
        });
        assert_eq!(report.status(), SyncStatus::Failed);
    }

    #[test]
    fn test_error_type_retry_policy() {
        assert!(SyncErrorType::RateLimitedShort.is_transient());
        assert_eq!(
            SyncErrorType::RateLimitedShort.retry_delay_secs(),
            Some(900)
        );
        assert!(!SyncErrorType::TokenRevoked.is_transient());
        assert_eq!(SyncErrorType::TokenRevoked.retry_delay_secs(), None);
        assert!(!SyncErrorType::TransformError.is_transient());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(SyncPriority::Critical > SyncPriority::High);
        assert!(SyncPriority::High > SyncPriority::Normal);
        assert!(SyncPriority::Normal > SyncPriority::Low);
    }

    #[test]
    fn test_baseline_bounds() {
        let baseline = Baseline {
            metric: Metric::HrvRmssd,
            mean_all: Some(50.0),
            mean_7d: None,
            mean_30d: None,
            mean_90d: None,
            median: Some(50.0),
            q1: Some(45.0),
            q3: Some(55.0),
            std_dev: None,
            min_value: None,
            max_value: None,
            sample_count: 21,
            status: BaselineStatus::Ready,
            data_start_date: None,
            data_end_date: None,
            computed_at: Utc::now(),
        };
        // IQR = 10, warning [30, 70], critical [15, 85]
        assert_eq!(baseline.iqr(), Some(10.0));
        assert_eq!(baseline.warning_bounds(), Some((30.0, 70.0)));
        assert_eq!(baseline.classify(50.0), None);
        assert_eq!(baseline.classify(25.0), Some(Severity::Warning));
        assert_eq!(baseline.classify(10.0), Some(Severity::Critical));
        assert_eq!(baseline.classify(90.0), Some(Severity::Critical));
    }

    #[test]
    fn test_enum_storage_round_trips() {
        for endpoint in Endpoint::ALL {
            assert_eq!(Endpoint::from_storage(endpoint.as_str()), Some(endpoint));
        }
        for metric in Metric::BASELINE_SET {
            assert_eq!(Metric::from_storage(metric.as_str()), Some(metric));
        }
        assert_eq!(
            SyncErrorType::from_storage("rate_limited_short"),
            Some(SyncErrorType::RateLimitedShort)
        );
        assert_eq!(SyncStatus::from_storage("partial"), SyncStatus::Partial);
    }
}
