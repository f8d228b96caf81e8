//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    -- ============================================
    -- LAYER 1: Canonical series and accounts
    -- ============================================

    CREATE TABLE IF NOT EXISTS users (
        user_id          TEXT PRIMARY KEY,
        access_token     TEXT,
        token_expires_at DATETIME,
        is_active        INTEGER NOT NULL DEFAULT 1,
        last_synced_at   DATETIME,
        created_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_users_last_synced ON users(last_synced_at);

    -- One value per (user, metric, day). Re-syncing a day overwrites in
    -- place; the natural key makes concurrent upserts for different
    -- days/users conflict-free.
    CREATE TABLE IF NOT EXISTS metric_samples (
        user_id          TEXT NOT NULL REFERENCES users(user_id),
        metric           TEXT NOT NULL,
        date             DATE NOT NULL,
        value            REAL NOT NULL,
        updated_at       DATETIME NOT NULL,

        UNIQUE(user_id, metric, date)
    );

    CREATE INDEX IF NOT EXISTS idx_samples_user_metric_date
        ON metric_samples(user_id, metric, date DESC);

    -- ============================================
    -- LAYER 2: Derived (regenerable) snapshots
    -- ============================================

    -- Replaced wholesale per (user, metric) on every recompute.
    CREATE TABLE IF NOT EXISTS baselines (
        user_id          TEXT NOT NULL REFERENCES users(user_id),
        metric           TEXT NOT NULL,
        mean_all         REAL,
        mean_7d          REAL,
        mean_30d         REAL,
        mean_90d         REAL,
        median           REAL,
        q1               REAL,
        q3               REAL,
        std_dev          REAL,
        min_value        REAL,
        max_value        REAL,
        sample_count     INTEGER NOT NULL DEFAULT 0,
        status           TEXT NOT NULL,
        data_start_date  DATE,
        data_end_date    DATE,
        computed_at      DATETIME NOT NULL,

        UNIQUE(user_id, metric)
    );

    -- Replaced wholesale per (user, pattern_name) on every detection pass.
    CREATE TABLE IF NOT EXISTS patterns (
        user_id              TEXT NOT NULL REFERENCES users(user_id),
        pattern_type         TEXT NOT NULL,
        pattern_name         TEXT NOT NULL,
        metrics_involved     JSON NOT NULL,
        analysis_window_days INTEGER NOT NULL DEFAULT 30,
        score                REAL,
        confidence           REAL,
        significance         TEXT NOT NULL,
        details              JSON,
        sample_count         INTEGER NOT NULL DEFAULT 0,
        analyzed_at          DATETIME NOT NULL,

        UNIQUE(user_id, pattern_name)
    );

    -- ============================================
    -- Audit trail
    -- ============================================

    -- One row per sync attempt. Immutable after write, except the two
    -- analytics flags flipped when post-sync recomputation finishes.
    CREATE TABLE IF NOT EXISTS sync_logs (
        id                     INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id                TEXT NOT NULL,
        job_id                 TEXT NOT NULL,
        trigger_source         TEXT NOT NULL,
        priority               TEXT,
        started_at             DATETIME NOT NULL,
        completed_at           DATETIME,
        duration_ms            INTEGER,
        status                 TEXT NOT NULL,
        error_type             TEXT,
        error_message          TEXT,
        records_synced         JSON,
        endpoint_errors        JSON,
        api_calls_made         INTEGER NOT NULL DEFAULT 0,
        baselines_recalculated INTEGER NOT NULL DEFAULT 0,
        patterns_detected      INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_sync_logs_user_started ON sync_logs(user_id, started_at DESC);
    CREATE INDEX IF NOT EXISTS idx_sync_logs_status_started ON sync_logs(status, started_at);
    CREATE INDEX IF NOT EXISTS idx_sync_logs_error_type
        ON sync_logs(error_type) WHERE error_type IS NOT NULL;
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "users",
            "metric_samples",
            "baselines",
            "patterns",
            "sync_logs",
        ];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }
}
