//! Interval worker that drains due follow-up jobs from the database queue.
//! Claims use SKIP LOCKED, so multiple api instances can run the worker
//! concurrently without double-firing a job inside the reclaim window.

use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::engine::feedback;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::jobs;

const CLAIM_BATCH: i64 = 20;

pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(state))
}

async fn run(state: AppState) {
    let poll_seconds = std::env::var("TRIAGE_FOLLOWUP_POLL_SECONDS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(30)
        .max(1);

    let mut interval = tokio::time::interval(Duration::from_secs(poll_seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(poll_seconds, "Follow-up worker started");

    loop {
        interval.tick().await;
        match drain_due(&state).await {
            Ok(0) => {}
            Ok(handled) => tracing::info!(handled, "Processed follow-up jobs"),
            Err(err) => tracing::error!(error = ?err, "Follow-up worker pass failed"),
        }
    }
}

async fn drain_due(state: &AppState) -> Result<u32, AppError> {
    let due = jobs::claim_due(&state.db, CLAIM_BATCH).await?;
    let mut handled = 0;

    for job in due {
        match feedback::run_followup_check(state, job.ticket_id, &job.kind).await {
            Ok(()) => {
                jobs::complete(&state.db, job.id).await?;
                handled += 1;
            }
            Err(err) => {
                tracing::error!(
                    job_id = %job.id,
                    ticket_id = %job.ticket_id,
                    kind = %job.kind,
                    attempts = job.attempts,
                    error = ?err,
                    "Follow-up job failed, releasing for retry"
                );
                jobs::release(&state.db, job.id).await?;
            }
        }
    }

    Ok(handled)
}
