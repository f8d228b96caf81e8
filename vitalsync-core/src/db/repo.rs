//! Database repository layer
//!
//! Provides query and insert operations for users, metric series, derived
//! analytics snapshots, and the sync audit trail.

use crate::error::Result;
use crate::types::*;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Counts of sync attempts by status over a time window.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub total: i64,
    pub successful: i64,
    pub partial: i64,
    pub failed: i64,
    pub skipped: i64,
}

impl SyncStats {
    /// Success rate in percent (success + partial count as delivered data).
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.successful + self.partial) as f64 / self.total as f64 * 100.0
    }
}

/// Database handle with a single guarded connection
pub struct Database {
    conn: Mutex<Connection>,
}

fn parse_datetime(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_datetime(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn parse_opt_date(value: Option<String>) -> Option<NaiveDate> {
    value
        .as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run schema migrations
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Users
    // ============================================

    /// Insert or update a user account
    pub fn upsert_user(&self, user: &UserAccount) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO users (user_id, access_token, token_expires_at, is_active, last_synced_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                token_expires_at = excluded.token_expires_at,
                is_active = excluded.is_active
            "#,
            params![
                user.user_id,
                user.access_token,
                user.token_expires_at.map(|t| t.to_rfc3339()),
                user.is_active as i32,
                user.last_synced_at.map(|t| t.to_rfc3339()),
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch one user account
    pub fn get_user(&self, user_id: &str) -> Result<Option<UserAccount>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT user_id, access_token, token_expires_at, is_active, last_synced_at, created_at
                 FROM users WHERE user_id = ?1",
                [user_id],
                Self::map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// All user accounts, oldest sync first (never-synced users lead)
    pub fn list_users(&self) -> Result<Vec<UserAccount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, access_token, token_expires_at, is_active, last_synced_at, created_at
             FROM users
             ORDER BY last_synced_at IS NOT NULL, last_synced_at ASC",
        )?;
        let users = stmt
            .query_map([], Self::map_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Record a successful sync time for a user
    pub fn set_last_synced(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE users SET last_synced_at = ?1 WHERE user_id = ?2",
            params![at.to_rfc3339(), user_id],
        )?;
        Ok(())
    }

    fn map_user(row: &Row<'_>) -> rusqlite::Result<UserAccount> {
        Ok(UserAccount {
            user_id: row.get(0)?,
            access_token: row.get(1)?,
            token_expires_at: parse_opt_datetime(row.get(2)?),
            is_active: row.get::<_, i32>(3)? != 0,
            last_synced_at: parse_opt_datetime(row.get(4)?),
            created_at: parse_datetime(&row.get::<_, String>(5)?),
        })
    }

    // ============================================
    // Metric series
    // ============================================

    /// Upsert one sample, keyed by (user, metric, date). Last write wins.
    pub fn upsert_metric_sample(
        &self,
        user_id: &str,
        metric: &str,
        date: NaiveDate,
        value: f64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO metric_samples (user_id, metric, date, value, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, metric, date) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![
                user_id,
                metric,
                date.to_string(),
                value,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Ordered series for (user, metric) from `since` onward, oldest first
    pub fn get_series(
        &self,
        user_id: &str,
        metric: &str,
        since: NaiveDate,
    ) -> Result<Vec<MetricSample>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT date, value FROM metric_samples
             WHERE user_id = ?1 AND metric = ?2 AND date >= ?3
             ORDER BY date ASC",
        )?;
        let samples = stmt
            .query_map(params![user_id, metric, since.to_string()], |row| {
                let date: String = row.get(0)?;
                Ok((date, row.get::<_, f64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|(date, value)| {
                NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .ok()
                    .map(|date| MetricSample { date, value })
            })
            .collect();
        Ok(samples)
    }

    /// Most recent sample for (user, metric)
    pub fn latest_sample(&self, user_id: &str, metric: &str) -> Result<Option<MetricSample>> {
        let conn = self.conn.lock().unwrap();
        let sample = conn
            .query_row(
                "SELECT date, value FROM metric_samples
                 WHERE user_id = ?1 AND metric = ?2
                 ORDER BY date DESC LIMIT 1",
                params![user_id, metric],
                |row| {
                    let date: String = row.get(0)?;
                    Ok((date, row.get::<_, f64>(1)?))
                },
            )
            .optional()?;
        Ok(sample.and_then(|(date, value)| {
            NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .ok()
                .map(|date| MetricSample { date, value })
        }))
    }

    /// Earliest sample date across all of a user's metrics
    pub fn earliest_sample_date(&self, user_id: &str) -> Result<Option<NaiveDate>> {
        let conn = self.conn.lock().unwrap();
        let date: Option<String> = conn.query_row(
            "SELECT MIN(date) FROM metric_samples WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(parse_opt_date(date))
    }

    /// Latest sample date across all of a user's metrics
    pub fn latest_sample_date(&self, user_id: &str) -> Result<Option<NaiveDate>> {
        let conn = self.conn.lock().unwrap();
        let date: Option<String> = conn.query_row(
            "SELECT MAX(date) FROM metric_samples WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(parse_opt_date(date))
    }

    // ============================================
    // Baselines
    // ============================================

    /// Replace the baseline snapshot for (user, metric).
    ///
    /// The whole row is rewritten; fields are never merged with the
    /// previous snapshot.
    pub fn replace_baseline(&self, user_id: &str, baseline: &Baseline) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO baselines (
                user_id, metric, mean_all, mean_7d, mean_30d, mean_90d,
                median, q1, q3, std_dev, min_value, max_value,
                sample_count, status, data_start_date, data_end_date, computed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                user_id,
                baseline.metric.as_str(),
                baseline.mean_all,
                baseline.mean_7d,
                baseline.mean_30d,
                baseline.mean_90d,
                baseline.median,
                baseline.q1,
                baseline.q3,
                baseline.std_dev,
                baseline.min_value,
                baseline.max_value,
                baseline.sample_count as i64,
                baseline.status.as_str(),
                baseline.data_start_date.map(|d| d.to_string()),
                baseline.data_end_date.map(|d| d.to_string()),
                baseline.computed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All baselines for a user
    pub fn get_baselines(&self, user_id: &str) -> Result<Vec<Baseline>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT metric, mean_all, mean_7d, mean_30d, mean_90d, median, q1, q3,
                    std_dev, min_value, max_value, sample_count, status,
                    data_start_date, data_end_date, computed_at
             FROM baselines WHERE user_id = ?1 ORDER BY metric",
        )?;
        let rows = stmt
            .query_map([user_id], Self::map_baseline)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().flatten().collect())
    }

    /// One baseline for (user, metric)
    pub fn get_baseline(&self, user_id: &str, metric: Metric) -> Result<Option<Baseline>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT metric, mean_all, mean_7d, mean_30d, mean_90d, median, q1, q3,
                        std_dev, min_value, max_value, sample_count, status,
                        data_start_date, data_end_date, computed_at
                 FROM baselines WHERE user_id = ?1 AND metric = ?2",
                params![user_id, metric.as_str()],
                Self::map_baseline,
            )
            .optional()?;
        Ok(row.flatten())
    }

    fn map_baseline(row: &Row<'_>) -> rusqlite::Result<Option<Baseline>> {
        let metric_name: String = row.get(0)?;
        let Some(metric) = Metric::from_storage(&metric_name) else {
            return Ok(None);
        };
        Ok(Some(Baseline {
            metric,
            mean_all: row.get(1)?,
            mean_7d: row.get(2)?,
            mean_30d: row.get(3)?,
            mean_90d: row.get(4)?,
            median: row.get(5)?,
            q1: row.get(6)?,
            q3: row.get(7)?,
            std_dev: row.get(8)?,
            min_value: row.get(9)?,
            max_value: row.get(10)?,
            sample_count: row.get::<_, i64>(11)? as usize,
            status: BaselineStatus::from_storage(&row.get::<_, String>(12)?),
            data_start_date: parse_opt_date(row.get(13)?),
            data_end_date: parse_opt_date(row.get(14)?),
            computed_at: parse_datetime(&row.get::<_, String>(15)?),
        }))
    }

    // ============================================
    // Patterns
    // ============================================

    /// Replace the pattern snapshot for (user, pattern_name)
    pub fn replace_pattern(&self, user_id: &str, pattern: &Pattern) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO patterns (
                user_id, pattern_type, pattern_name, metrics_involved,
                analysis_window_days, score, confidence, significance,
                details, sample_count, analyzed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                user_id,
                pattern.pattern_type.as_str(),
                pattern.name,
                serde_json::to_string(&pattern.metrics_involved).unwrap_or_else(|_| "[]".into()),
                pattern.analysis_window_days,
                pattern.score,
                pattern.confidence,
                pattern.significance.as_str(),
                pattern.details.to_string(),
                pattern.sample_count as i64,
                pattern.analyzed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All patterns for a user, most recently analyzed first
    pub fn get_patterns(&self, user_id: &str) -> Result<Vec<Pattern>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT pattern_type, pattern_name, metrics_involved, analysis_window_days,
                    score, confidence, significance, details, sample_count, analyzed_at
             FROM patterns WHERE user_id = ?1 ORDER BY analyzed_at DESC",
        )?;
        let rows = stmt
            .query_map([user_id], Self::map_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().flatten().collect())
    }

    /// One pattern for (user, name)
    pub fn get_pattern(&self, user_id: &str, name: &str) -> Result<Option<Pattern>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT pattern_type, pattern_name, metrics_involved, analysis_window_days,
                        score, confidence, significance, details, sample_count, analyzed_at
                 FROM patterns WHERE user_id = ?1 AND pattern_name = ?2",
                params![user_id, name],
                Self::map_pattern,
            )
            .optional()?;
        Ok(row.flatten())
    }

    fn map_pattern(row: &Row<'_>) -> rusqlite::Result<Option<Pattern>> {
        let type_name: String = row.get(0)?;
        let Some(pattern_type) = PatternType::from_storage(&type_name) else {
            return Ok(None);
        };
        let metrics_json: String = row.get(2)?;
        let details_json: Option<String> = row.get(7)?;
        Ok(Some(Pattern {
            pattern_type,
            name: row.get(1)?,
            metrics_involved: serde_json::from_str(&metrics_json).unwrap_or_default(),
            analysis_window_days: row.get::<_, i64>(3)? as u32,
            score: row.get(4)?,
            confidence: row.get(5)?,
            significance: Significance::from_storage(&row.get::<_, String>(6)?),
            details: details_json
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or(serde_json::Value::Null),
            sample_count: row.get::<_, i64>(8)? as usize,
            analyzed_at: parse_datetime(&row.get::<_, String>(9)?),
        }))
    }

    // ============================================
    // Sync audit trail
    // ============================================

    /// Insert the audit row for a completed sync attempt. Returns the row id.
    pub fn insert_sync_log(&self, report: &SyncReport) -> Result<i64> {
        let records: BTreeMap<String, u32> = report
            .endpoint_counts
            .iter()
            .map(|(endpoint, &count)| (endpoint.as_str().to_string(), count))
            .collect();
        let errors: BTreeMap<String, &EndpointError> = report
            .endpoint_errors
            .iter()
            .map(|(endpoint, error)| (endpoint.as_str().to_string(), error))
            .collect();
        let primary = report.primary_error();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO sync_logs (
                user_id, job_id, trigger_source, priority, started_at, completed_at,
                duration_ms, status, error_type, error_message,
                records_synced, endpoint_errors, api_calls_made
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                report.user_id,
                report.job_id,
                report.trigger.as_str(),
                report.priority.map(|p| p.as_str()),
                report.started_at.to_rfc3339(),
                report.completed_at.to_rfc3339(),
                report.duration_ms(),
                report.status().as_str(),
                primary.map(|e| e.error_type.as_str()),
                primary.map(|e| e.message.clone()),
                serde_json::to_string(&records)?,
                serde_json::to_string(&errors)?,
                report.api_calls_made,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Flip the analytics-completion flags on an audit row
    pub fn mark_sync_analytics(&self, log_id: i64, baselines: bool, patterns: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sync_logs SET baselines_recalculated = ?1, patterns_detected = ?2 WHERE id = ?3",
            params![baselines as i32, patterns as i32, log_id],
        )?;
        Ok(())
    }

    /// Recent sync attempts for a user, newest first
    pub fn get_sync_history(&self, user_id: &str, limit: usize) -> Result<Vec<SyncLogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, job_id, trigger_source, priority, started_at, completed_at,
                    duration_ms, status, error_type, error_message, records_synced,
                    endpoint_errors, api_calls_made, baselines_recalculated, patterns_detected
             FROM sync_logs WHERE user_id = ?1
             ORDER BY started_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], Self::map_sync_log)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most recent successful (or partial) sync completion time for a user
    pub fn last_successful_sync(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let completed: Option<String> = conn
            .query_row(
                "SELECT completed_at FROM sync_logs
                 WHERE user_id = ?1 AND status IN ('success', 'partial')
                 ORDER BY started_at DESC LIMIT 1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(parse_opt_datetime(completed))
    }

    /// Sync outcome counts over the last 24 hours
    pub fn sync_stats_last_24h(&self) -> Result<SyncStats> {
        let cutoff = (Utc::now() - chrono::Duration::days(1)).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM sync_logs WHERE started_at >= ?1 GROUP BY status",
        )?;
        let mut stats = SyncStats::default();
        let rows = stmt.query_map([cutoff], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            stats.total += count;
            match SyncStatus::from_storage(&status) {
                SyncStatus::Success => stats.successful += count,
                SyncStatus::Partial => stats.partial += count,
                SyncStatus::Failed => stats.failed += count,
                SyncStatus::Skipped => stats.skipped += count,
            }
        }
        Ok(stats)
    }

    fn map_sync_log(row: &Row<'_>) -> rusqlite::Result<SyncLogEntry> {
        let records_json: Option<String> = row.get(11)?;
        let errors_json: Option<String> = row.get(12)?;
        Ok(SyncLogEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            job_id: row.get(2)?,
            trigger: SyncTrigger::from_storage(&row.get::<_, String>(3)?),
            priority: row
                .get::<_, Option<String>>(4)?
                .as_deref()
                .and_then(SyncPriority::from_storage),
            started_at: parse_datetime(&row.get::<_, String>(5)?),
            completed_at: parse_opt_datetime(row.get(6)?),
            duration_ms: row.get(7)?,
            status: SyncStatus::from_storage(&row.get::<_, String>(8)?),
            error_type: row
                .get::<_, Option<String>>(9)?
                .as_deref()
                .and_then(SyncErrorType::from_storage),
            error_message: row.get(10)?,
            records_synced: records_json
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            endpoint_errors: errors_json
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            api_calls_made: row.get::<_, i64>(13)? as u32,
            baselines_recalculated: row.get::<_, i32>(14)? != 0,
            patterns_detected: row.get::<_, i32>(15)? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn test_user(id: &str) -> UserAccount {
        UserAccount {
            user_id: id.to_string(),
            access_token: Some("token".to_string()),
            token_expires_at: Some(Utc::now() + chrono::Duration::days(30)),
            is_active: true,
            last_synced_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_round_trip() {
        let db = test_db();
        db.upsert_user(&test_user("u1")).unwrap();

        let user = db.get_user("u1").unwrap().unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.access_token.as_deref(), Some("token"));
        assert!(user.is_active);
        assert!(user.last_synced_at.is_none());

        assert!(db.get_user("nobody").unwrap().is_none());
    }

    #[test]
    fn test_sample_upsert_overwrites() {
        let db = test_db();
        db.upsert_user(&test_user("u1")).unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        db.upsert_metric_sample("u1", "hrv_rmssd", date, 48.0).unwrap();
        db.upsert_metric_sample("u1", "hrv_rmssd", date, 52.0).unwrap();

        let series = db
            .get_series("u1", "hrv_rmssd", NaiveDate::from_ymd_opt(2026, 6, 1).unwrap())
            .unwrap();
        // Re-syncing the same date overwrites, never duplicates
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].value, 52.0);
    }

    #[test]
    fn test_series_ordering_and_since_filter() {
        let db = test_db();
        db.upsert_user(&test_user("u1")).unwrap();

        for (day, value) in [(3, 30.0), (1, 10.0), (2, 20.0)] {
            let date = NaiveDate::from_ymd_opt(2026, 7, day).unwrap();
            db.upsert_metric_sample("u1", "sleep_score", date, value)
                .unwrap();
        }

        let series = db
            .get_series(
                "u1",
                "sleep_score",
                NaiveDate::from_ymd_opt(2026, 7, 2).unwrap(),
            )
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].value, 20.0);
        assert_eq!(series[1].value, 30.0);

        let latest = db.latest_sample("u1", "sleep_score").unwrap().unwrap();
        assert_eq!(latest.value, 30.0);
    }

    #[test]
    fn test_baseline_replace_wholesale() {
        let db = test_db();
        db.upsert_user(&test_user("u1")).unwrap();

        let mut baseline = Baseline {
            metric: Metric::HrvRmssd,
            mean_all: Some(50.0),
            mean_7d: Some(48.0),
            mean_30d: Some(51.0),
            mean_90d: None,
            median: Some(50.0),
            q1: Some(45.0),
            q3: Some(55.0),
            std_dev: Some(4.2),
            min_value: Some(40.0),
            max_value: Some(60.0),
            sample_count: 30,
            status: BaselineStatus::Ready,
            data_start_date: NaiveDate::from_ymd_opt(2026, 6, 1),
            data_end_date: NaiveDate::from_ymd_opt(2026, 6, 30),
            computed_at: Utc::now(),
        };
        db.replace_baseline("u1", &baseline).unwrap();

        // Second snapshot with fewer populated fields must fully replace
        baseline.mean_30d = None;
        baseline.sample_count = 10;
        baseline.status = BaselineStatus::Partial;
        db.replace_baseline("u1", &baseline).unwrap();

        let stored = db.get_baseline("u1", Metric::HrvRmssd).unwrap().unwrap();
        assert_eq!(stored.sample_count, 10);
        assert_eq!(stored.status, BaselineStatus::Partial);
        assert!(stored.mean_30d.is_none(), "old field must not survive");

        assert_eq!(db.get_baselines("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_sync_log_round_trip() {
        let db = test_db();
        db.upsert_user(&test_user("u1")).unwrap();

        let now = Utc::now();
        let report = SyncReport {
            user_id: "u1".to_string(),
            job_id: "job-1".to_string(),
            trigger: SyncTrigger::Scheduler,
            priority: Some(SyncPriority::High),
            started_at: now,
            completed_at: now + chrono::Duration::milliseconds(1500),
            endpoint_counts: [(Endpoint::Recharge, 7)].into_iter().collect(),
            endpoint_errors: [(
                Endpoint::Sleep,
                EndpointError {
                    error_type: SyncErrorType::TokenRevoked,
                    message: "sharing consent revoked".to_string(),
                },
            )]
            .into_iter()
            .collect(),
            api_calls_made: 2,
            fatal_error: None,
            skipped: false,
        };

        let id = db.insert_sync_log(&report).unwrap();
        db.mark_sync_analytics(id, true, true).unwrap();

        let history = db.get_sync_history("u1", 10).unwrap();
        assert_eq!(history.len(), 1);
        let entry = &history[0];
        assert_eq!(entry.status, SyncStatus::Partial);
        assert_eq!(entry.trigger, SyncTrigger::Scheduler);
        assert_eq!(entry.priority, Some(SyncPriority::High));
        assert_eq!(entry.records_synced.get("recharge"), Some(&7));
        assert_eq!(
            entry.endpoint_errors.get("sleep").map(|e| e.error_type),
            Some(SyncErrorType::TokenRevoked)
        );
        assert!(entry.baselines_recalculated);
        assert_eq!(entry.duration_ms, Some(1500));

        let last = db.last_successful_sync("u1").unwrap();
        assert!(last.is_some(), "partial counts as a successful delivery");

        let stats = db.sync_stats_last_24h().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.partial, 1);
    }
}
