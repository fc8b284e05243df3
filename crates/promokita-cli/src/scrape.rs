//! Scrape command handlers.
//!
//! `run` assembles the full pipeline against the live database and drives
//! it directly, without the HTTP server in between.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use promokita_core::{load_platform_catalog, AppConfig, PersistenceGateway};
use promokita_db::PgGateway;
use promokita_scraper::{CycleOutcome, Orchestrator, ScrapeStats};

/// Run one scrape cycle, a single platform, or a repeating schedule.
///
/// # Errors
///
/// Returns an error if the catalog or orchestrator cannot be built, or if a
/// single-platform run fails. In schedule mode per-cycle failures are logged
/// and the loop continues.
pub(crate) async fn run(
    pool: &PgPool,
    config: &AppConfig,
    platform: Option<&str>,
    schedule: bool,
) -> anyhow::Result<()> {
    let mut catalog = load_platform_catalog(&config.platforms_path)?;
    catalog.apply_enable_overrides(|key| std::env::var(key));

    let gateway: Arc<dyn PersistenceGateway> = Arc::new(PgGateway::new(pool.clone()));
    let orchestrator = Orchestrator::from_config(config, &catalog, gateway)
        .map_err(|e| anyhow::anyhow!("orchestrator setup failed: {e}"))?;

    if schedule {
        run_scheduled(&orchestrator, platform, config.scrape_interval_secs).await;
    } else {
        match platform {
            Some(slug) => {
                let stats = orchestrator.run_platform(slug).await?;
                print_stats(slug, &stats);
            }
            None => run_once(&orchestrator).await,
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}

async fn run_once(orchestrator: &Orchestrator) {
    match orchestrator.run_cycle().await {
        CycleOutcome::Completed(report) => {
            println!(
                "cycle finished: {} platforms, found {}, saved {}, updated {}, errors {}, expired {} ({} ms)",
                report.platforms.len(),
                report.total_found,
                report.total_saved,
                report.total_updated,
                report.total_errors,
                report.expired,
                report.duration_ms
            );
        }
        CycleOutcome::Skipped => println!("a cycle is already in flight; nothing to do"),
    }
}

/// Repeat until ctrl-c, sleeping the configured interval between runs.
async fn run_scheduled(orchestrator: &Orchestrator, platform: Option<&str>, interval_secs: u64) {
    let interval = Duration::from_secs(interval_secs.max(60));
    println!("scheduled mode: running every {}s, ctrl-c to stop", interval.as_secs());

    loop {
        match platform {
            Some(slug) => match orchestrator.run_platform(slug).await {
                Ok(stats) => print_stats(slug, &stats),
                Err(e) => eprintln!("error: scrape of '{slug}' failed: {e}"),
            },
            None => run_once(orchestrator).await,
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "ctrl-c handler failed, stopping");
                }
                println!("stopping scheduled runs");
                break;
            }
        }
    }
}

fn print_stats(slug: &str, stats: &ScrapeStats) {
    println!(
        "{slug}: found {}, saved {}, updated {}, failed {}",
        stats.found, stats.saved, stats.updated, stats.failed
    );
}

/// Store-side status: coupon counts by status and the most recent scrape
/// session per platform.
///
/// # Errors
///
/// Returns an error if a query fails.
pub(crate) async fn status(pool: &PgPool) -> anyhow::Result<()> {
    let counts = promokita_db::stats_by_status(pool).await?;
    if counts.is_empty() {
        println!("no coupons stored yet");
    } else {
        println!("coupons:");
        for (status, count) in &counts {
            println!("  {status:<10} {count}");
        }
    }

    let platforms: std::collections::HashMap<i64, String> = promokita_db::list_platforms(pool)
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    let sessions = promokita_db::latest_sessions(pool).await?;
    if sessions.is_empty() {
        println!("no scrape sessions recorded yet");
        return Ok(());
    }

    println!("latest sessions:");
    for session in &sessions {
        let platform = platforms
            .get(&session.platform_id)
            .map_or("(unknown)", String::as_str);
        let duration = session
            .duration_ms
            .map_or_else(|| "-".to_string(), |ms| format!("{ms} ms"));
        println!(
            "  {platform:<14} {:<10} started {} | found {} saved {} updated {} failed {} | {duration}",
            session.status,
            session.started_at.format("%Y-%m-%d %H:%M:%S"),
            session.items_found,
            session.items_saved,
            session.items_updated,
            session.items_failed,
        );
    }

    Ok(())
}
