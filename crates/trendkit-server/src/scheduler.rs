//! Background job scheduler.
//!
//! Registers the weekly collection run and starts the scheduler at server
//! startup.

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use trendkit_pipeline::TrendPipeline;

/// Monday 03:00 UTC, after the ISO week has rolled over.
pub const WEEKLY_RUN_SCHEDULE: &str = "0 0 3 * * MON";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pipeline: Arc<TrendPipeline>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_weekly_job(&scheduler, pipeline).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the weekly collection job followed by retention cleanup.
async fn register_weekly_job(
    scheduler: &JobScheduler,
    pipeline: Arc<TrendPipeline>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(WEEKLY_RUN_SCHEDULE, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);

        Box::pin(async move {
            tracing::info!("scheduler: starting weekly trend run");
            run_weekly_job(&pipeline).await;
            tracing::info!("scheduler: weekly trend run complete");
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Collect the week that just ended, then apply retention. Errors are logged;
/// the next tick retries.
async fn run_weekly_job(pipeline: &TrendPipeline) {
    let today = Utc::now().date_naive();
    // Monday 03:00: the previous ISO week is the one to report on.
    let target = today - chrono::Duration::days(1);

    match pipeline.run_weekly(target, false).await {
        Ok(generated) => {
            let gaps = generated
                .report
                .provenance
                .iter()
                .filter(|p| p.is_gap())
                .count();
            tracing::info!(
                week = %generated.report.week,
                reused = generated.reused,
                gaps,
                "scheduler: weekly report ready"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: weekly run failed");
            return;
        }
    }

    if let Err(e) = pipeline.cleanup_old_reports(today).await {
        tracing::warn!(error = %e, "scheduler: retention cleanup failed");
    }
}
