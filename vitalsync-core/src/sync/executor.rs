//! Sync executor: one user's full sync across all endpoints.
//!
//! The key correctness property is per-endpoint isolation: every endpoint
//! is attempted regardless of what happened to the previous ones, and a
//! single failure (a revoked consent 403, a timeout, a malformed payload)
//! only ever costs that endpoint's records. After all endpoints are
//! attempted the executor writes one audit row and hands baseline/pattern
//! recomputation to a background task that finishes before the user can be
//! dispatched again.

use crate::analytics::{BaselineEngine, PatternEngine};
use crate::config::{AnalyticsConfig, Config, SyncConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::sync::fetcher::EndpointFetcher;
use crate::sync::rate_limit::{Acquire, RateLimitTracker};
use crate::sync::transform;
use crate::types::*;
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Tracks which users currently have a sync (or its follow-up analytics)
/// in flight. Claimed before the first fetch, released only after
/// recomputation completes, so one user never has two overlapping syncs.
#[derive(Default)]
pub struct InFlightGuard {
    users: Mutex<HashSet<String>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a user. Returns false if already in flight.
    pub fn try_claim(&self, user_id: &str) -> bool {
        self.users.lock().unwrap().insert(user_id.to_string())
    }

    pub fn release(&self, user_id: &str) {
        self.users.lock().unwrap().remove(user_id);
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.users.lock().unwrap().contains(user_id)
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().unwrap().is_empty()
    }
}

/// Runs one user's full sync: fetch, transform, upsert, audit, recompute.
pub struct SyncExecutor {
    db: Arc<Database>,
    fetcher: Arc<dyn EndpointFetcher>,
    rate_limiter: Arc<RateLimitTracker>,
    in_flight: Arc<InFlightGuard>,
    sync_config: SyncConfig,
    analytics_config: AnalyticsConfig,
}

impl SyncExecutor {
    pub fn new(
        db: Arc<Database>,
        fetcher: Arc<dyn EndpointFetcher>,
        rate_limiter: Arc<RateLimitTracker>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            fetcher,
            rate_limiter,
            in_flight: Arc::new(InFlightGuard::new()),
            sync_config: config.sync.clone(),
            analytics_config: config.analytics,
        }
    }

    /// Shared in-flight guard, also consulted by the scheduler.
    pub fn in_flight(&self) -> Arc<InFlightGuard> {
        self.in_flight.clone()
    }

    /// Sync all endpoints for one user and write the audit row.
    ///
    /// Always returns a `SyncReport` for conditions arising after entry
    /// (bad token, endpoint failures); only repository-level faults
    /// surface as `Err`.
    pub async fn sync_user(
        &self,
        user_id: &str,
        trigger: SyncTrigger,
        priority: Option<SyncPriority>,
    ) -> Result<SyncReport> {
        let started_at = Utc::now();
        let job_id = Uuid::new_v4().to_string();

        if !self.in_flight.try_claim(user_id) {
            tracing::warn!(user_id, trigger = trigger.as_str(), "Sync already in flight, skipping");
            let report = SyncReport {
                user_id: user_id.to_string(),
                job_id,
                trigger,
                priority,
                started_at,
                completed_at: Utc::now(),
                endpoint_counts: BTreeMap::new(),
                endpoint_errors: BTreeMap::new(),
                api_calls_made: 0,
                fatal_error: Some(EndpointError {
                    error_type: SyncErrorType::InternalError,
                    message: "a sync for this user is already in progress".to_string(),
                }),
                skipped: true,
            };
            self.db.insert_sync_log(&report)?;
            return Ok(report);
        }

        let result = self
            .sync_user_inner(user_id, trigger, priority, job_id, started_at)
            .await;

        match &result {
            // On success/partial the spawned analytics task owns the guard.
            Ok(report) if report.status() == SyncStatus::Success
                || report.status() == SyncStatus::Partial => {}
            _ => self.in_flight.release(user_id),
        }

        result
    }

    async fn sync_user_inner(
        &self,
        user_id: &str,
        trigger: SyncTrigger,
        priority: Option<SyncPriority>,
        job_id: String,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<SyncReport> {
        tracing::info!(user_id, job_id, trigger = trigger.as_str(), "Starting user sync");

        let user = self
            .db
            .get_user(user_id)?
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;

        // Pre-flight: without a usable token no endpoint is worth attempting.
        if let Some(fatal) = self.check_token(&user) {
            tracing::warn!(
                user_id,
                job_id,
                error_type = fatal.error_type.as_str(),
                "Sync aborted before any endpoint"
            );
            let report = SyncReport {
                user_id: user_id.to_string(),
                job_id,
                trigger,
                priority,
                started_at,
                completed_at: Utc::now(),
                endpoint_counts: BTreeMap::new(),
                endpoint_errors: BTreeMap::new(),
                api_calls_made: 0,
                fatal_error: Some(fatal),
                skipped: false,
            };
            self.db.insert_sync_log(&report)?;
            return Ok(report);
        }
        let token = user.access_token.clone().unwrap_or_default();

        let since = Utc::now().date_naive() - Duration::days(self.sync_config.lookback_days as i64);

        let mut endpoint_counts: BTreeMap<Endpoint, u32> = BTreeMap::new();
        let mut endpoint_errors: BTreeMap<Endpoint, EndpointError> = BTreeMap::new();
        let mut api_calls_made = 0u32;

        for endpoint in Endpoint::ALL {
            match self.rate_limiter.try_acquire(user_id) {
                Acquire::Denied { retry_after } => {
                    endpoint_errors.insert(endpoint, self.rate_limit_error(user_id, endpoint, retry_after));
                    continue;
                }
                Acquire::Permit => {}
            }

            api_calls_made += 1;
            match self.fetcher.fetch(endpoint, user_id, &token, since).await {
                Ok(records) => {
                    match self.store_records(user_id, endpoint, &records) {
                        Ok(count) => {
                            endpoint_counts.insert(endpoint, count);
                            tracing::debug!(
                                user_id,
                                endpoint = endpoint.as_str(),
                                records = count,
                                "Endpoint synced"
                            );
                        }
                        Err(error) => {
                            tracing::warn!(
                                user_id,
                                endpoint = endpoint.as_str(),
                                error_type = error.error_type.as_str(),
                                error = %error.message,
                                "Endpoint store failed"
                            );
                            endpoint_errors.insert(endpoint, error);
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        user_id,
                        endpoint = endpoint.as_str(),
                        error_type = error.error_type.as_str(),
                        error = %error.message,
                        "Endpoint fetch failed"
                    );
                    endpoint_errors.insert(endpoint, error);
                }
            }
        }

        let report = SyncReport {
            user_id: user_id.to_string(),
            job_id: job_id.clone(),
            trigger,
            priority,
            started_at,
            completed_at: Utc::now(),
            endpoint_counts,
            endpoint_errors,
            api_calls_made,
            fatal_error: None,
            skipped: false,
        };

        let status = report.status();
        let log_id = self.db.insert_sync_log(&report)?;

        tracing::info!(
            user_id,
            job_id,
            status = status.as_str(),
            records = report.total_records(),
            errors = report.endpoint_errors.len(),
            api_calls = report.api_calls_made,
            duration_ms = report.duration_ms(),
            "Sync completed"
        );

        if status == SyncStatus::Success || status == SyncStatus::Partial {
            self.db.set_last_synced(user_id, report.completed_at)?;
            self.spawn_post_sync_analytics(user_id.to_string(), log_id);
        }

        Ok(report)
    }

    fn check_token(&self, user: &UserAccount) -> Option<EndpointError> {
        match &user.access_token {
            None => Some(EndpointError {
                error_type: SyncErrorType::TokenInvalid,
                message: "no access token on file, authentication required".to_string(),
            }),
            Some(_) => match user.token_expires_at {
                Some(expires_at) if expires_at <= Utc::now() => Some(EndpointError {
                    error_type: SyncErrorType::TokenExpired,
                    message: "access token has expired, refresh required".to_string(),
                }),
                _ => None,
            },
        }
    }

    fn rate_limit_error(
        &self,
        user_id: &str,
        endpoint: Endpoint,
        retry_after: std::time::Duration,
    ) -> EndpointError {
        // Tell the two windows apart so retry policy can differ.
        let snapshot = self.rate_limiter.snapshot(user_id);
        let error_type = if snapshot.long_remaining == 0 {
            SyncErrorType::RateLimitedLong
        } else {
            SyncErrorType::RateLimitedShort
        };
        EndpointError {
            error_type,
            message: format!(
                "{}: call budget exhausted, retry in {}s",
                endpoint,
                retry_after.as_secs()
            ),
        }
    }

    /// Transform and upsert all records for one endpoint.
    fn store_records(
        &self,
        user_id: &str,
        endpoint: Endpoint,
        records: &[crate::sync::fetcher::EndpointRecord],
    ) -> std::result::Result<u32, EndpointError> {
        let mut count = 0u32;
        for record in records {
            let samples =
                transform::metric_values(endpoint, &record.payload).map_err(|message| {
                    EndpointError {
                        error_type: SyncErrorType::TransformError,
                        message: format!("{}: {}", endpoint, message),
                    }
                })?;
            for (metric, value) in samples {
                self.db
                    .upsert_metric_sample(user_id, metric, record.date, value)
                    .map_err(|e| EndpointError {
                        error_type: SyncErrorType::DatabaseError,
                        message: format!("{}: failed to store sample: {}", endpoint, e),
                    })?;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Recompute baselines and patterns off the sync path.
    ///
    /// Fire-and-forget from the caller's perspective; the in-flight guard
    /// stays claimed until this finishes, which keeps the recompute from
    /// stacking under the user's next scheduled sync.
    fn spawn_post_sync_analytics(&self, user_id: String, log_id: i64) {
        let db = self.db.clone();
        let in_flight = self.in_flight.clone();
        let analytics_config = self.analytics_config;

        tokio::spawn(async move {
            let baseline_engine = BaselineEngine::new(db.clone(), analytics_config);
            let baselines_done = match baseline_engine.compute_all(&user_id) {
                Ok(results) => {
                    tracing::info!(user_id, baselines = results.len(), "Baselines recalculated");
                    true
                }
                Err(e) => {
                    tracing::error!(user_id, error = %e, "Baseline recalculation failed");
                    false
                }
            };

            let pattern_engine = PatternEngine::new(db.clone(), analytics_config);
            let patterns_done = match pattern_engine.detect_all(&user_id) {
                Ok(results) => {
                    tracing::info!(user_id, patterns = results.len(), "Pattern detection complete");
                    true
                }
                Err(e) => {
                    tracing::error!(user_id, error = %e, "Pattern detection failed");
                    false
                }
            };

            if let Err(e) = db.mark_sync_analytics(log_id, baselines_done, patterns_done) {
                tracing::warn!(user_id, error = %e, "Failed to record analytics completion");
            }

            in_flight.release(&user_id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::sync::fetcher::EndpointRecord;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::collections::HashMap;

    /// Scripted fetcher: per-endpoint record lists or failures.
    struct ScriptedFetcher {
        outcomes: HashMap<Endpoint, std::result::Result<Vec<EndpointRecord>, EndpointError>>,
    }

    #[async_trait]
    impl EndpointFetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            endpoint: Endpoint,
            _user_id: &str,
            _token: &str,
            _since: NaiveDate,
        ) -> std::result::Result<Vec<EndpointRecord>, EndpointError> {
            self.outcomes
                .get(&endpoint)
                .cloned()
                .unwrap_or_else(|| Ok(vec![]))
        }
    }

    fn record(date: &str, payload: serde_json::Value) -> EndpointRecord {
        EndpointRecord {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            payload,
        }
    }

    fn sleep_records(n: u32) -> Vec<EndpointRecord> {
        (0..n)
            .map(|i| {
                record(
                    &format!("2026-07-{:02}", i + 1),
                    json!({ "sleep_score": 80.0 + i as f64 }),
                )
            })
            .collect()
    }

    fn recharge_records(n: u32) -> Vec<EndpointRecord> {
        (0..n)
            .map(|i| {
                record(
                    &format!("2026-07-{:02}", i + 1),
                    json!({ "hrv_avg": 50.0, "heart_rate_avg": 52.0 }),
                )
            })
            .collect()
    }

    fn full_success_outcomes(
    ) -> HashMap<Endpoint, std::result::Result<Vec<EndpointRecord>, EndpointError>> {
        let mut outcomes = HashMap::new();
        outcomes.insert(Endpoint::Sleep, Ok(sleep_records(5)));
        outcomes.insert(Endpoint::Recharge, Ok(recharge_records(5)));
        outcomes.insert(
            Endpoint::Activity,
            Ok(vec![record(
                "2026-07-01",
                json!({ "active_calories": 500.0, "steps": 9000.0 }),
            )]),
        );
        outcomes
    }

    fn executor_with(
        outcomes: HashMap<Endpoint, std::result::Result<Vec<EndpointRecord>, EndpointError>>,
    ) -> (SyncExecutor, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        db.upsert_user(&UserAccount {
            user_id: "u1".to_string(),
            access_token: Some("token".to_string()),
            token_expires_at: Some(Utc::now() + Duration::days(30)),
            is_active: true,
            last_synced_at: None,
            created_at: Utc::now(),
        })
        .unwrap();

        let config = Config::default();
        let executor = SyncExecutor::new(
            db.clone(),
            Arc::new(ScriptedFetcher { outcomes }),
            Arc::new(RateLimitTracker::new(RateLimitConfig::default())),
            &config,
        );
        (executor, db)
    }

    async fn wait_for_analytics(executor: &SyncExecutor, user_id: &str) {
        let guard = executor.in_flight();
        for _ in 0..200 {
            if !guard.contains(user_id) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("post-sync analytics did not release the in-flight guard");
    }

    #[tokio::test]
    async fn test_all_endpoints_succeed() {
        let (executor, db) = executor_with(full_success_outcomes());
        let report = executor
            .sync_user("u1", SyncTrigger::Manual, None)
            .await
            .unwrap();

        assert_eq!(report.status(), SyncStatus::Success);
        assert_eq!(report.endpoint_counts[&Endpoint::Sleep], 5);
        assert_eq!(report.endpoint_counts.len(), Endpoint::ALL.len());
        assert!(report.endpoint_errors.is_empty());
        assert_eq!(report.api_calls_made, Endpoint::ALL.len() as u32);

        wait_for_analytics(&executor, "u1").await;

        // Audit row exists and analytics completion was recorded
        let history = db.get_sync_history("u1", 5).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, SyncStatus::Success);
        assert!(history[0].baselines_recalculated);
        assert!(history[0].patterns_detected);

        // last_synced_at advanced
        assert!(db.get_user("u1").unwrap().unwrap().last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_single_endpoint_failure_is_isolated() {
        let mut outcomes = full_success_outcomes();
        outcomes.insert(
            Endpoint::Sleep,
            Err(EndpointError {
                error_type: SyncErrorType::TokenRevoked,
                message: "sleep: data sharing consent not granted".to_string(),
            }),
        );
        let (executor, db) = executor_with(outcomes);

        let report = executor
            .sync_user("u1", SyncTrigger::Api, None)
            .await
            .unwrap();

        assert_eq!(report.status(), SyncStatus::Partial);
        // The sleep failure must not reduce any other endpoint's count
        assert_eq!(report.endpoint_counts[&Endpoint::Recharge], 5);
        assert_eq!(report.endpoint_counts[&Endpoint::Activity], 1);
        assert_eq!(
            report.endpoint_counts.len(),
            Endpoint::ALL.len() - 1,
            "all other endpoints must still be attempted"
        );
        assert_eq!(report.endpoint_errors.len(), 1);
        assert_eq!(
            report.endpoint_errors[&Endpoint::Sleep].error_type,
            SyncErrorType::TokenRevoked
        );

        wait_for_analytics(&executor, "u1").await;

        // Other endpoints' data landed despite the failure
        let series = db
            .get_series(
                "u1",
                "hrv_rmssd",
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            )
            .unwrap();
        assert_eq!(series.len(), 5);
    }

    #[tokio::test]
    async fn test_all_endpoints_fail() {
        let mut outcomes = HashMap::new();
        for endpoint in Endpoint::ALL {
            outcomes.insert(
                endpoint,
                Err(EndpointError {
                    error_type: SyncErrorType::ApiUnavailable,
                    message: "down".to_string(),
                }),
            );
        }
        let (executor, db) = executor_with(outcomes);

        let report = executor
            .sync_user("u1", SyncTrigger::Scheduler, Some(SyncPriority::High))
            .await
            .unwrap();

        assert_eq!(report.status(), SyncStatus::Failed);
        assert_eq!(report.endpoint_errors.len(), Endpoint::ALL.len());
        assert!(report.endpoint_counts.is_empty());

        // Failed sync releases the guard without analytics
        assert!(!executor.in_flight().contains("u1"));
        assert!(db.get_user("u1").unwrap().unwrap().last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_missing_token_fails_preflight() {
        let (executor, db) = executor_with(HashMap::new());
        db.upsert_user(&UserAccount {
            user_id: "u2".to_string(),
            access_token: None,
            token_expires_at: None,
            is_active: true,
            last_synced_at: None,
            created_at: Utc::now(),
        })
        .unwrap();

        let report = executor
            .sync_user("u2", SyncTrigger::Manual, None)
            .await
            .unwrap();

        assert_eq!(report.status(), SyncStatus::Failed);
        assert_eq!(report.api_calls_made, 0);
        assert!(report.endpoint_counts.is_empty());
        assert_eq!(
            report.fatal_error.as_ref().unwrap().error_type,
            SyncErrorType::TokenInvalid
        );

        let history = db.get_sync_history("u2", 5).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn test_expired_token_fails_preflight() {
        let (executor, db) = executor_with(full_success_outcomes());
        db.upsert_user(&UserAccount {
            user_id: "u3".to_string(),
            access_token: Some("stale".to_string()),
            token_expires_at: Some(Utc::now() - Duration::hours(1)),
            is_active: true,
            last_synced_at: None,
            created_at: Utc::now(),
        })
        .unwrap();

        let report = executor
            .sync_user("u3", SyncTrigger::Manual, None)
            .await
            .unwrap();

        assert_eq!(report.status(), SyncStatus::Failed);
        assert_eq!(
            report.fatal_error.as_ref().unwrap().error_type,
            SyncErrorType::TokenExpired
        );
    }

    #[tokio::test]
    async fn test_rate_limit_denial_recorded_per_endpoint() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        db.upsert_user(&UserAccount {
            user_id: "u1".to_string(),
            access_token: Some("token".to_string()),
            token_expires_at: None,
            is_active: true,
            last_synced_at: None,
            created_at: Utc::now(),
        })
        .unwrap();

        // Budget covers only 3 of the 13 endpoints this cycle
        let config = Config::default();
        let executor = SyncExecutor::new(
            db.clone(),
            Arc::new(ScriptedFetcher {
                outcomes: full_success_outcomes(),
            }),
            Arc::new(RateLimitTracker::new(RateLimitConfig {
                short_window_minutes: 15,
                short_window_limit: 3,
                long_window_limit: 100,
            })),
            &config,
        );

        let report = executor
            .sync_user("u1", SyncTrigger::Scheduler, None)
            .await
            .unwrap();

        assert_eq!(report.status(), SyncStatus::Partial);
        assert_eq!(report.api_calls_made, 3);
        assert_eq!(report.endpoint_counts.len(), 3);
        assert_eq!(report.endpoint_errors.len(), Endpoint::ALL.len() - 3);
        for error in report.endpoint_errors.values() {
            assert_eq!(error.error_type, SyncErrorType::RateLimitedShort);
        }

        wait_for_analytics(&executor, "u1").await;
    }

    #[tokio::test]
    async fn test_in_flight_user_is_skipped() {
        let (executor, db) = executor_with(full_success_outcomes());

        // Simulate a sync still running for this user
        assert!(executor.in_flight().try_claim("u1"));

        let report = executor
            .sync_user("u1", SyncTrigger::Scheduler, None)
            .await
            .unwrap();
        assert_eq!(report.status(), SyncStatus::Skipped);
        assert!(report.endpoint_counts.is_empty());

        let history = db.get_sync_history("u1", 5).unwrap();
        assert_eq!(history[0].status, SyncStatus::Skipped);

        // The original claim must survive the skip
        assert!(executor.in_flight().contains("u1"));
        executor.in_flight().release("u1");
    }

    #[tokio::test]
    async fn test_transform_failure_classified_as_data_error() {
        let mut outcomes = full_success_outcomes();
        outcomes.insert(
            Endpoint::Sleep,
            Ok(vec![record("2026-07-01", json!({ "wrong_key": 1 }))]),
        );
        let (executor, _db) = executor_with(outcomes);

        let report = executor
            .sync_user("u1", SyncTrigger::Manual, None)
            .await
            .unwrap();

        assert_eq!(report.status(), SyncStatus::Partial);
        assert_eq!(
            report.endpoint_errors[&Endpoint::Sleep].error_type,
            SyncErrorType::TransformError
        );
        assert_eq!(report.endpoint_counts[&Endpoint::Recharge], 5);

        wait_for_analytics(&executor, "u1").await;
    }
}
