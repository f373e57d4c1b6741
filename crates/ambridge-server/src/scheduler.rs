//! Background job scheduler.
//!
//! Runs the subscription sweep that realizes the pending-staleness and
//! cancellation-grace timeouts.

use chrono::Utc;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Every 15 seconds; the shortest window it serves is the 30 s grace period.
const SWEEP_SCHEDULE: &str = "*/15 * * * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(pool: PgPool) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_subscription_sweep(&scheduler, pool).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_subscription_sweep(
    scheduler: &JobScheduler,
    pool: PgPool,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(SWEEP_SCHEDULE, move |_uuid, _lock| {
        let pool = pool.clone();
        Box::pin(async move {
            match crate::lifecycle::sweep(&pool, Utc::now()).await {
                Ok(0) => tracing::debug!("scheduler: subscription sweep found nothing due"),
                Ok(count) => tracing::info!(count, "scheduler: subscription sweep applied transitions"),
                Err(e) => tracing::error!(error = %e, "scheduler: subscription sweep failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
