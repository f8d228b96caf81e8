//! Priority-based background sync scheduler.
//!
//! On a fixed interval the scheduler ranks every known user by staleness
//! and urgency, then dispatches the most pressing ones to the sync
//! executor. Dispatches are staggered and capped so the peak upstream call
//! rate stays bounded independently of the per-user rate limiter. A user
//! already mid-sync (or mid-recompute) is never re-dispatched.

use crate::config::SyncConfig;
use crate::db::Database;
use crate::error::Result;
use crate::sync::executor::SyncExecutor;
use crate::types::*;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Compute a user's scheduling priority, or `None` when the user is not
/// yet due for a sync.
///
/// Pure function of observable state, recomputed each pass:
/// - never synced, or token expiring within the cycle: critical
/// - active user: >= 48h critical, >= 12h high
/// - inactive user: >= 7d low, >= 24h normal
pub fn priority_for(
    user: &UserAccount,
    now: DateTime<Utc>,
    cycle: Duration,
) -> Option<SyncPriority> {
    if user.access_token.is_none() {
        return None;
    }

    let last_synced = match user.last_synced_at {
        None => return Some(SyncPriority::Critical),
        Some(t) => t,
    };

    if let Some(expires_at) = user.token_expires_at {
        if expires_at <= now + cycle && expires_at > now {
            return Some(SyncPriority::Critical);
        }
    }

    let hours = (now - last_synced).num_minutes() as f64 / 60.0;

    if user.is_active {
        if hours >= 48.0 {
            Some(SyncPriority::Critical)
        } else if hours >= 12.0 {
            Some(SyncPriority::High)
        } else {
            None
        }
    } else if hours >= 168.0 {
        Some(SyncPriority::Low)
    } else if hours >= 24.0 {
        Some(SyncPriority::Normal)
    } else {
        None
    }
}

/// Aggregate outcome of one scheduling cycle.
#[derive(Debug, Default)]
pub struct CycleStats {
    pub candidates: usize,
    pub dispatched: usize,
    pub successful: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Sync state summary exposed to the external API layer.
#[derive(Debug)]
pub struct SyncStatusSummary {
    pub last_sync: Option<DateTime<Utc>>,
    pub next_scheduled: Option<DateTime<Utc>>,
    pub recent_history: Vec<SyncLogEntry>,
}

/// Background scheduler driving the sync executor.
pub struct SyncScheduler {
    db: Arc<Database>,
    executor: Arc<SyncExecutor>,
    config: SyncConfig,
    next_cycle_at: Mutex<Option<DateTime<Utc>>>,
}

impl SyncScheduler {
    pub fn new(db: Arc<Database>, executor: Arc<SyncExecutor>, config: SyncConfig) -> Self {
        Self {
            db,
            executor,
            config,
            next_cycle_at: Mutex::new(None),
        }
    }

    /// Run the scheduler until `shutdown` flips to true.
    ///
    /// In-flight syncs are allowed to finish their current work; only the
    /// start of new cycles is gated.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            tracing::info!("Sync scheduler disabled by configuration");
            return;
        }

        let interval = std::time::Duration::from_secs(self.config.interval_minutes * 60);
        tracing::info!(
            interval_minutes = self.config.interval_minutes,
            max_users_per_run = self.config.max_users_per_run,
            "Sync scheduler started"
        );

        if self.config.sync_on_startup {
            tracing::info!("Running startup sync cycle");
            if let Err(e) = self.run_cycle(SyncTrigger::Startup).await {
                tracing::error!(error = %e, "Startup sync cycle failed");
            }
        }

        loop {
            *self.next_cycle_at.lock().unwrap() =
                Some(Utc::now() + Duration::from_std(interval).unwrap_or(Duration::hours(1)));

            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.run_cycle(SyncTrigger::Scheduler).await {
                        tracing::error!(error = %e, "Sync cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Sync scheduler stopped");
    }

    /// Execute one scheduling cycle: select due users, dispatch them.
    pub async fn run_cycle(&self, trigger: SyncTrigger) -> Result<CycleStats> {
        let cycle_start = Utc::now();
        let cycle = Duration::minutes(self.config.interval_minutes as i64);

        // SELECTING: rank all users by (priority, staleness)
        let users = self.db.list_users()?;
        let mut candidates: Vec<(UserAccount, SyncPriority, i64)> = users
            .into_iter()
            .filter_map(|user| {
                let priority = priority_for(&user, cycle_start, cycle)?;
                let staleness = user
                    .last_synced_at
                    .map(|t| (cycle_start - t).num_seconds())
                    .unwrap_or(i64::MAX);
                Some((user, priority, staleness))
            })
            .collect();

        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));

        let mut stats = CycleStats {
            candidates: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() {
            tracing::debug!("No users need syncing this cycle");
            return Ok(stats);
        }

        tracing::info!(
            trigger = trigger.as_str(),
            candidates = candidates.len(),
            dispatching = candidates.len().min(self.config.max_users_per_run),
            "Processing sync queue"
        );

        // DISPATCHING: staggered, concurrency-capped fan-out
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_syncs.max(1)));
        let in_flight = self.executor.in_flight();
        let stagger = std::time::Duration::from_millis(self.config.stagger_ms);
        let mut join_set: JoinSet<Result<SyncReport>> = JoinSet::new();

        for (index, (user, priority, _)) in candidates
            .into_iter()
            .take(self.config.max_users_per_run)
            .enumerate()
        {
            // Idempotent dispatch: skip users still syncing or recomputing
            if in_flight.contains(&user.user_id) {
                tracing::debug!(user_id = %user.user_id, "User still in flight, not re-dispatching");
                continue;
            }

            if index > 0 && !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }

            let executor = self.executor.clone();
            let semaphore = semaphore.clone();
            stats.dispatched += 1;
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                executor
                    .sync_user(&user.user_id, trigger, Some(priority))
                    .await
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(report)) => match report.status() {
                    SyncStatus::Success => stats.successful += 1,
                    SyncStatus::Partial => stats.partial += 1,
                    SyncStatus::Failed => stats.failed += 1,
                    SyncStatus::Skipped => stats.skipped += 1,
                },
                Ok(Err(e)) => {
                    stats.failed += 1;
                    tracing::error!(error = %e, "Sync task failed");
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::error!(error = %e, "Sync task panicked");
                }
            }
        }

        tracing::info!(
            dispatched = stats.dispatched,
            successful = stats.successful,
            partial = stats.partial,
            failed = stats.failed,
            skipped = stats.skipped,
            duration_ms = (Utc::now() - cycle_start).num_milliseconds(),
            "Sync cycle complete"
        );

        Ok(stats)
    }

    /// Sync state for one user: last success, next cycle, recent audit rows.
    pub fn sync_status(&self, user_id: &str) -> Result<SyncStatusSummary> {
        Ok(SyncStatusSummary {
            last_sync: self.db.last_successful_sync(user_id)?,
            next_scheduled: *self.next_cycle_at.lock().unwrap(),
            recent_history: self.db.get_sync_history(user_id, 10)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(
        id: &str,
        hours_since_sync: Option<i64>,
        is_active: bool,
        token_expires_in_hours: Option<i64>,
    ) -> UserAccount {
        let now = Utc::now();
        UserAccount {
            user_id: id.to_string(),
            access_token: Some("token".to_string()),
            token_expires_at: token_expires_in_hours.map(|h| now + Duration::hours(h)),
            is_active,
            last_synced_at: hours_since_sync.map(|h| now - Duration::hours(h)),
            created_at: now - Duration::days(30),
        }
    }

    fn priority(user: &UserAccount) -> Option<SyncPriority> {
        priority_for(user, Utc::now(), Duration::minutes(60))
    }

    #[test]
    fn test_never_synced_is_critical() {
        assert_eq!(
            priority(&user("u", None, true, None)),
            Some(SyncPriority::Critical)
        );
    }

    #[test]
    fn test_token_expiring_within_cycle_is_critical() {
        // Freshly synced, but token dies before the next cycle
        let u = user("u", Some(1), true, Some(0));
        let result = priority_for(
            &UserAccount {
                token_expires_at: Some(Utc::now() + Duration::minutes(30)),
                ..u
            },
            Utc::now(),
            Duration::minutes(60),
        );
        assert_eq!(result, Some(SyncPriority::Critical));
    }

    #[test]
    fn test_active_user_ladder() {
        assert_eq!(priority(&user("u", Some(1), true, None)), None);
        assert_eq!(
            priority(&user("u", Some(13), true, None)),
            Some(SyncPriority::High)
        );
        assert_eq!(
            priority(&user("u", Some(49), true, None)),
            Some(SyncPriority::Critical)
        );
    }

    #[test]
    fn test_inactive_user_ladder() {
        assert_eq!(priority(&user("u", Some(13), false, None)), None);
        assert_eq!(
            priority(&user("u", Some(25), false, None)),
            Some(SyncPriority::Normal)
        );
        // Dormant 7d+ accounts drop to the lowest tier
        assert_eq!(
            priority(&user("u", Some(24 * 8), false, None)),
            Some(SyncPriority::Low)
        );
    }

    #[test]
    fn test_no_token_never_scheduled() {
        let mut u = user("u", Some(100), true, None);
        u.access_token = None;
        assert_eq!(priority(&u), None);
    }

    #[test]
    fn test_selection_ordering() {
        // Same candidate-ranking comparison the cycle uses
        let now = Utc::now();
        let cycle = Duration::minutes(60);
        let users = vec![
            user("high-12h", Some(13), true, None),
            user("critical-50h", Some(50), true, None),
            user("high-30h", Some(30), true, None),
        ];

        let mut candidates: Vec<(String, SyncPriority, i64)> = users
            .iter()
            .filter_map(|u| {
                let p = priority_for(u, now, cycle)?;
                let staleness = u
                    .last_synced_at
                    .map(|t| (now - t).num_seconds())
                    .unwrap_or(i64::MAX);
                Some((u.user_id.clone(), p, staleness))
            })
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));

        let order: Vec<&str> = candidates.iter().map(|c| c.0.as_str()).collect();
        // Highest priority first, then longest-stale first
        assert_eq!(order, vec!["critical-50h", "high-30h", "high-12h"]);
    }
}
