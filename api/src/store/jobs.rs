use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::AppError;

/// Re-verify that an autonomous resolution held, then request feedback.
pub const KIND_RESOLUTION_CHECK: &str = "resolution_check";
/// Check whether a tentative fix worked; escalate when it did not.
pub const KIND_FOLLOWUP_CHECK: &str = "followup_check";

/// Jobs past this many attempts are abandoned instead of retried forever.
pub const MAX_ATTEMPTS: i32 = 5;

/// A claim older than this is presumed dead and the job becomes claimable
/// again — the at-least-once half of the delivery contract.
const RECLAIM_AFTER: &str = "10 minutes";

/// Internal row type for sqlx mapping
#[derive(Debug, sqlx::FromRow)]
pub struct FollowupJobRow {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub kind: String,
    pub params: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub attempts: i32,
}

/// Enqueue a delayed check. Callers schedule inside the same transaction
/// that records the action, so a job exists if and only if the action
/// committed.
pub async fn schedule(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
    kind: &str,
    params: &serde_json::Value,
    run_at: DateTime<Utc>,
) -> Result<Uuid, AppError> {
    let id = Uuid::now_v7();
    sqlx::query(
        r#"
        INSERT INTO followup_jobs (id, ticket_id, kind, params, run_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(ticket_id)
    .bind(kind)
    .bind(params)
    .bind(run_at)
    .execute(exec)
    .await?;

    Ok(id)
}

/// Claim up to `limit` due jobs. SKIP LOCKED keeps concurrent workers from
/// fighting over the same rows; each claim bumps the attempt counter.
pub async fn claim_due(
    exec: impl PgExecutor<'_>,
    limit: i64,
) -> Result<Vec<FollowupJobRow>, AppError> {
    let rows = sqlx::query_as::<_, FollowupJobRow>(&format!(
        r#"
        UPDATE followup_jobs
        SET claimed_at = now(), attempts = attempts + 1
        WHERE id IN (
            SELECT id FROM followup_jobs
            WHERE completed_at IS NULL
              AND run_at <= now()
              AND (claimed_at IS NULL OR claimed_at < now() - interval '{RECLAIM_AFTER}')
              AND attempts < $2
            ORDER BY run_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, ticket_id, kind, params, run_at, attempts
        "#
    ))
    .bind(limit)
    .bind(MAX_ATTEMPTS)
    .fetch_all(exec)
    .await?;

    Ok(rows)
}

pub async fn complete(exec: impl PgExecutor<'_>, job_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE followup_jobs SET completed_at = now() WHERE id = $1")
        .bind(job_id)
        .execute(exec)
        .await?;
    Ok(())
}

/// Release a failed claim so the next poll retries it before the reclaim
/// window would.
pub async fn release(exec: impl PgExecutor<'_>, job_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE followup_jobs SET claimed_at = NULL WHERE id = $1")
        .bind(job_id)
        .execute(exec)
        .await?;
    Ok(())
}

/// Drop pending (unclaimed, incomplete) jobs of one kind for a ticket.
/// Returns the number of cancelled jobs.
pub async fn cancel_pending(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
    kind: &str,
) -> Result<u64, AppError> {
    let result = sqlx::query(
        r#"
        DELETE FROM followup_jobs
        WHERE ticket_id = $1 AND kind = $2 AND completed_at IS NULL AND claimed_at IS NULL
        "#,
    )
    .bind(ticket_id)
    .bind(kind)
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}
