//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring scrape cycle plus an hourly expiry cleanup.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use promokita_scraper::Orchestrator;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    orchestrator: Arc<Orchestrator>,
    scrape_interval_secs: u64,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_scrape_job(&scheduler, orchestrator, scrape_interval_secs).await?;
    register_cleanup_job(&scheduler, pool).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the recurring scrape cycle. A tick that lands while a cycle is
/// still running is absorbed by the orchestrator's in-flight guard and
/// surfaces as a logged skip, never a queued second cycle.
async fn register_scrape_job(
    scheduler: &JobScheduler,
    orchestrator: Arc<Orchestrator>,
    interval_secs: u64,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_repeated_async(
        Duration::from_secs(interval_secs.max(60)),
        move |_uuid, _lock| {
            let orchestrator = Arc::clone(&orchestrator);
            Box::pin(async move {
                tracing::info!("scheduler: scrape cycle tick");
                orchestrator.run_cycle().await;
            })
        },
    )?;

    scheduler.add(job).await?;
    Ok(())
}

/// Register an hourly sweep that expires coupons past their validity.
///
/// The orchestrator also expires after each cycle; this job covers long
/// gaps between cycles (large intervals, scraping disabled).
async fn register_cleanup_job(
    scheduler: &JobScheduler,
    pool: PgPool,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async("0 0 * * * *", move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        Box::pin(async move {
            match promokita_db::expire_stale(&pool, Utc::now()).await {
                Ok(n) if n > 0 => {
                    tracing::info!(expired = n, "scheduler: expired stale coupons");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "scheduler: expiry cleanup failed");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
