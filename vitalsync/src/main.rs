//! vitalsync - background sync daemon
//!
//! Runs the priority-based sync scheduler against the provider API and
//! recomputes analytics after each user's sync.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/vitalsync/data.db (~/.local/share/vitalsync/data.db)
//! - Logs: $XDG_STATE_HOME/vitalsync/vitalsync.log (~/.local/state/vitalsync/vitalsync.log)
//! - Config: $XDG_CONFIG_HOME/vitalsync/config.toml (~/.config/vitalsync/config.toml)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use vitalsync_core::sync::{ProviderClient, RateLimitTracker, SyncExecutor, SyncScheduler};
use vitalsync_core::{Config, Database, SyncTrigger};

#[derive(Parser)]
#[command(name = "vitalsync")]
#[command(about = "Background sync daemon for wearable health data")]
#[command(version)]
struct Args {
    /// Run a single sync cycle and exit instead of scheduling
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        vitalsync_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("vitalsync daemon starting");

    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    db.migrate().context("failed to run database migrations")?;

    println!("Database: {}", db_path.display());

    let fetcher =
        Arc::new(ProviderClient::new(&config.provider).context("provider API not configured")?);
    let rate_limiter = Arc::new(RateLimitTracker::new(config.rate_limit));
    let executor = Arc::new(SyncExecutor::new(
        db.clone(),
        fetcher,
        rate_limiter,
        &config,
    ));
    let scheduler = Arc::new(SyncScheduler::new(
        db.clone(),
        executor.clone(),
        config.sync.clone(),
    ));

    if args.once {
        println!("Running a single sync cycle...");
        let stats = scheduler
            .run_cycle(SyncTrigger::Manual)
            .await
            .context("sync cycle failed")?;
        println!(
            "Cycle complete: {} dispatched, {} ok, {} partial, {} failed, {} skipped",
            stats.dispatched, stats.successful, stats.partial, stats.failed, stats.skipped
        );
        drain_in_flight(&executor).await;
        return Ok(());
    }

    println!(
        "Scheduler active (every {} minutes, up to {} users per cycle). Press Ctrl+C to stop.",
        config.sync.interval_minutes, config.sync.max_users_per_run
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    eprintln!("\nShutting down...");
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    scheduler_task.await.context("scheduler task panicked")?;

    // Let in-flight syncs finish their current endpoint and write their
    // audit rows rather than aborting mid-write.
    drain_in_flight(&executor).await;

    let stats = db.sync_stats_last_24h()?;
    println!(
        "Last 24h: {} syncs, {} ok, {} partial, {} failed ({:.0}% delivering data)",
        stats.total,
        stats.successful,
        stats.partial,
        stats.failed,
        stats.success_rate()
    );

    tracing::info!("vitalsync daemon stopped");
    Ok(())
}

/// Wait (bounded) for in-flight syncs and their analytics to complete.
async fn drain_in_flight(executor: &SyncExecutor) {
    let guard = executor.in_flight();
    if guard.is_empty() {
        return;
    }

    println!("Waiting for {} in-flight sync(s) to finish...", guard.len());
    for _ in 0..600 {
        if guard.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tracing::warn!(
        remaining = guard.len(),
        "Shutdown proceeding with syncs still in flight"
    );
}
