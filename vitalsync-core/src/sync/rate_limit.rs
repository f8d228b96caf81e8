//! Per-user dual-window rate limit tracking for the provider API.
//!
//! The provider enforces two rolling budgets per user: a short window
//! (15 minutes by default) and a 24-hour window. A call is permitted only
//! when BOTH windows have remaining budget, and a granted permit decrements
//! both. Windows reset lazily on access - there is no background timer.

use crate::config::RateLimitConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Result of a permit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// Call may proceed; both window counters were decremented.
    Permit,
    /// Budget exhausted in at least one window.
    Denied {
        /// Time until the last exhausted window refills.
        retry_after: std::time::Duration,
    },
}

impl Acquire {
    pub fn is_permit(&self) -> bool {
        matches!(self, Acquire::Permit)
    }
}

/// Point-in-time view of one user's budget, for informational
/// X-RateLimit-* response headers produced by the surrounding API layer.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSnapshot {
    pub short_limit: u32,
    pub short_remaining: u32,
    pub short_resets_at: DateTime<Utc>,
    pub long_limit: u32,
    pub long_remaining: u32,
    pub long_resets_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    remaining: u32,
    resets_at: DateTime<Utc>,
}

impl Window {
    fn new(ceiling: u32, now: DateTime<Utc>, length: Duration) -> Self {
        Self {
            remaining: ceiling,
            resets_at: now + length,
        }
    }

    /// Refill if the window has elapsed. Must run before any remaining-count
    /// check so a stale counter can never deny a permissible call.
    fn reset_if_elapsed(&mut self, ceiling: u32, now: DateTime<Utc>, length: Duration) {
        while now >= self.resets_at {
            self.remaining = ceiling;
            self.resets_at += length;
        }
    }
}

#[derive(Debug)]
struct UserBudget {
    short: Window,
    long: Window,
}

/// Tracks per-user call budgets against the upstream API.
///
/// Each user's budget is an owned, mutex-guarded value; concurrent acquire
/// attempts for the same user serialize on that mutex so the
/// reset-check-decrement sequence can never race into an over-budget grant.
/// Syncs for different users only contend on the brief map lookup.
pub struct RateLimitTracker {
    config: RateLimitConfig,
    users: Mutex<HashMap<String, Arc<Mutex<UserBudget>>>>,
}

impl RateLimitTracker {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            users: Mutex::new(HashMap::new()),
        }
    }

    fn short_window(&self) -> Duration {
        Duration::minutes(self.config.short_window_minutes as i64)
    }

    fn long_window(&self) -> Duration {
        Duration::hours(24)
    }

    fn budget_for(&self, user_id: &str, now: DateTime<Utc>) -> Arc<Mutex<UserBudget>> {
        let mut users = self.users.lock().unwrap();
        users
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(UserBudget {
                    short: Window::new(self.config.short_window_limit, now, self.short_window()),
                    long: Window::new(self.config.long_window_limit, now, self.long_window()),
                }))
            })
            .clone()
    }

    /// Request a permit for one upstream call on behalf of `user_id`.
    pub fn try_acquire(&self, user_id: &str) -> Acquire {
        self.try_acquire_at(user_id, Utc::now())
    }

    /// Clock-injected variant of [`try_acquire`](Self::try_acquire).
    pub fn try_acquire_at(&self, user_id: &str, now: DateTime<Utc>) -> Acquire {
        let budget = self.budget_for(user_id, now);
        let mut budget = budget.lock().unwrap();

        budget
            .short
            .reset_if_elapsed(self.config.short_window_limit, now, self.short_window());
        budget
            .long
            .reset_if_elapsed(self.config.long_window_limit, now, self.long_window());

        if budget.short.remaining > 0 && budget.long.remaining > 0 {
            budget.short.remaining -= 1;
            budget.long.remaining -= 1;
            return Acquire::Permit;
        }

        // Wait until every exhausted window has refilled.
        let mut resume_at = now;
        if budget.short.remaining == 0 && budget.short.resets_at > resume_at {
            resume_at = budget.short.resets_at;
        }
        if budget.long.remaining == 0 && budget.long.resets_at > resume_at {
            resume_at = budget.long.resets_at;
        }
        let retry_after = (resume_at - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        tracing::debug!(
            user_id,
            short_remaining = budget.short.remaining,
            long_remaining = budget.long.remaining,
            retry_after_secs = retry_after.as_secs(),
            "Rate limit permit denied"
        );

        Acquire::Denied { retry_after }
    }

    /// Current budget state for a user, without consuming a permit.
    pub fn snapshot(&self, user_id: &str) -> RateLimitSnapshot {
        self.snapshot_at(user_id, Utc::now())
    }

    /// Clock-injected variant of [`snapshot`](Self::snapshot).
    pub fn snapshot_at(&self, user_id: &str, now: DateTime<Utc>) -> RateLimitSnapshot {
        let budget = self.budget_for(user_id, now);
        let mut budget = budget.lock().unwrap();

        budget
            .short
            .reset_if_elapsed(self.config.short_window_limit, now, self.short_window());
        budget
            .long
            .reset_if_elapsed(self.config.long_window_limit, now, self.long_window());

        RateLimitSnapshot {
            short_limit: self.config.short_window_limit,
            short_remaining: budget.short.remaining,
            short_resets_at: budget.short.resets_at,
            long_limit: self.config.long_window_limit,
            long_remaining: budget.long.remaining,
            long_resets_at: budget.long.resets_at,
        }
    }
}
