//! vitalsync-sync - trigger a sync for one user from the command line
//!
//! Registers users, runs a manual sync through the same executor the
//! scheduler uses (same audit trail), and prints sync history or fresh
//! insights.

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{ArgAction, Parser};
use std::sync::Arc;
use vitalsync_core::analytics::InsightsService;
use vitalsync_core::sync::{ProviderClient, RateLimitTracker, SyncExecutor};
use vitalsync_core::{Config, Database, SyncReport, SyncStatus, SyncTrigger, UserAccount};

#[derive(Parser)]
#[command(name = "vitalsync-sync")]
#[command(about = "Trigger a sync for one user")]
#[command(version)]
struct Args {
    /// User ID to sync
    #[arg(short, long)]
    user: String,

    /// Register (or update) the user instead of syncing
    #[arg(long)]
    register: bool,

    /// Provider access token (with --register)
    #[arg(long)]
    token: Option<String>,

    /// Token lifetime in days (with --register)
    #[arg(long, default_value = "365")]
    token_expires_days: i64,

    /// Show recent sync history after the sync
    #[arg(long)]
    history: bool,

    /// Print insights once post-sync analytics finish
    #[arg(long)]
    insights: bool,

    /// Verbose output (-v per-endpoint detail)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        vitalsync_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let db_path = Config::database_path();
    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    db.migrate().context("failed to run database migrations")?;

    if args.register {
        return register_user(&db, &args);
    }

    let fetcher =
        Arc::new(ProviderClient::new(&config.provider).context("provider API not configured")?);
    let rate_limiter = Arc::new(RateLimitTracker::new(config.rate_limit));
    let executor = SyncExecutor::new(db.clone(), fetcher, rate_limiter, &config);

    println!("Syncing user {}...", args.user);
    let report = executor
        .sync_user(&args.user, SyncTrigger::Manual, None)
        .await
        .context("sync failed")?;

    print_report(&report, args.verbose);

    if args.insights {
        wait_for_analytics(&executor, &args.user).await;
        print_insights(&db, &args.user)?;
    }

    if args.history {
        print_history(&db, &args.user)?;
    }

    Ok(())
}

fn register_user(db: &Database, args: &Args) -> Result<()> {
    let Some(token) = args.token.clone() else {
        bail!("--register requires --token");
    };

    let existing = db.get_user(&args.user)?;
    let user = UserAccount {
        user_id: args.user.clone(),
        access_token: Some(token),
        token_expires_at: Some(Utc::now() + Duration::days(args.token_expires_days)),
        is_active: true,
        last_synced_at: existing.as_ref().and_then(|u| u.last_synced_at),
        created_at: existing
            .map(|u| u.created_at)
            .unwrap_or_else(Utc::now),
    };
    db.upsert_user(&user)?;

    println!("Registered user {}", args.user);
    Ok(())
}

fn print_report(report: &SyncReport, verbose: u8) {
    let status = report.status();
    match status {
        SyncStatus::Success => println!(
            "\nSync succeeded: {} records across {} endpoints",
            report.total_records(),
            report.endpoint_counts.len()
        ),
        SyncStatus::Partial => println!(
            "\nSync succeeded with {} error(s): {} records across {} endpoints",
            report.endpoint_errors.len(),
            report.total_records(),
            report.endpoint_counts.len()
        ),
        SyncStatus::Failed => println!("\nSync failed"),
        SyncStatus::Skipped => println!("\nSync skipped: another sync is already running"),
    }

    if let Some(fatal) = &report.fatal_error {
        println!("  {}: {}", fatal.error_type, fatal.message);
    }

    for (endpoint, error) in &report.endpoint_errors {
        println!("  {} failed ({}): {}", endpoint, error.error_type, error.message);
    }

    if verbose >= 1 {
        println!("\nPer-endpoint records:");
        for (endpoint, count) in &report.endpoint_counts {
            println!("  {:24} {}", endpoint.to_string(), count);
        }
        println!(
            "\nAPI calls: {}, duration: {}ms",
            report.api_calls_made,
            report.duration_ms()
        );
    }
}

/// Post-sync analytics run in the background; wait for them so the
/// insights reflect the data we just pulled.
async fn wait_for_analytics(executor: &SyncExecutor, user_id: &str) {
    let guard = executor.in_flight();
    for _ in 0..300 {
        if !guard.contains(user_id) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    eprintln!("warning: analytics still running, insights may be stale");
}

fn print_insights(db: &Arc<Database>, user_id: &str) -> Result<()> {
    let report = InsightsService::new(db.clone()).insights(user_id)?;

    println!("\nInsights (status: {:?}, {} days of data):", report.status, report.data_age_days);
    for observation in &report.observations {
        match &observation.context {
            Some(context) => println!("  [{:?}] {} - {}", observation.priority, observation.fact, context),
            None => println!("  [{:?}] {}", observation.priority, observation.fact),
        }
    }
    for suggestion in &report.suggestions {
        println!("  -> {}: {}", suggestion.action, suggestion.description);
    }
    Ok(())
}

fn print_history(db: &Arc<Database>, user_id: &str) -> Result<()> {
    let history = db.get_sync_history(user_id, 10)?;
    if history.is_empty() {
        println!("\nNo sync history");
        return Ok(());
    }

    println!("\nRecent syncs:");
    for entry in history {
        let records: u32 = entry.records_synced.values().sum();
        println!(
            "  {} {:8} {:9} {} records, {} error(s)",
            entry.started_at.format("%Y-%m-%d %H:%M:%S"),
            entry.trigger.as_str(),
            entry.status.as_str(),
            records,
            entry.endpoint_errors.len()
        );
    }
    Ok(())
}
