//! # Scheduled Tasks
//!
//! `scheduled_tasks` is the module handling all the tasks that the server needs to regularly perform,
//! outside of the context of a given server request.
//!
//! The `initiate_scheduled_tasks(ServerState)` function is the one the main function should call to
//! initiate all the relevant tasks.

use crate::{scheduled_tasks::lib::clean_stale_processing_posts, ServerState};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

mod lib;

/// Sets up all the periodic tasks that the server needs to do, so they'll run at the appropriate times.
pub async fn initiate_scheduled_tasks(state: ServerState) -> Result<(), JobSchedulerError> {
    // `tokio_cron_scheduler` keeps these on wall-clock times, so restarting the server doesn't
    // restart the clock on when a given task should run. The syntax is from the `croner` library:
    //
    // [seconds] [minute] [hour] [day of month] [month] [day of week]
    // - * is a wildcard, meaning any value applies
    // - (*/num) means every value that cleanly divides by num. For example, (*/15) is once every 15 min.
    // - There's some shorthands, for example @hourly and @daily, that replace this entire pattern.

    let job_scheduler = JobScheduler::new().await.inspect_err(|err| {
        tracing::error!(error = ?err, "[JOB SCHEDULER] Failed creating job scheduler")
    })?;

    // Clean posts stuck in processing once an hour.
    let cleanup_job = Job::new_async("@hourly", move |_uuid, _scheduler| {
        let state = state.clone();
        Box::pin(async move {
            clean_stale_processing_posts(&state).await;
        })
    })
    .inspect_err(|err| {
        tracing::error!(error = ?err, "[JOB SCHEDULER] Failed creating clean_stale_processing_posts job")
    })?;

    job_scheduler.add(cleanup_job).await.inspect_err(|err| {
        tracing::error!(error = ?err, "[JOB SCHEDULER] Failed adding clean_stale_processing_posts job to list")
    })?;

    job_scheduler.start().await.inspect_err(|err| {
        tracing::error!(error = ?err, "[JOB SCHEDULER] Failed starting job scheduler")
    })
}
