use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use triage_core::resolution::ResolutionTracking;

use crate::error::AppError;

/// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct ResolutionRow {
    ticket_id: Uuid,
    autonomous_action: String,
    resolution_confirmed: Option<bool>,
    feedback_text: Option<String>,
    satisfaction_score: Option<i32>,
    followup_sent_at: Option<DateTime<Utc>>,
    response_received_at: Option<DateTime<Utc>>,
    reopened: bool,
    reopened_at: Option<DateTime<Utc>>,
    reopened_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResolutionRow {
    fn into_tracking(self) -> ResolutionTracking {
        ResolutionTracking {
            ticket_id: self.ticket_id,
            autonomous_action: self.autonomous_action,
            resolution_confirmed: self.resolution_confirmed,
            feedback_text: self.feedback_text,
            satisfaction_score: self.satisfaction_score,
            followup_sent_at: self.followup_sent_at,
            response_received_at: self.response_received_at,
            reopened: self.reopened,
            reopened_at: self.reopened_at,
            reopened_reason: self.reopened_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const RESOLUTION_COLUMNS: &str = "ticket_id, autonomous_action, resolution_confirmed, \
     feedback_text, satisfaction_score, followup_sent_at, response_received_at, reopened, \
     reopened_at, reopened_reason, created_at, updated_at";

/// Lazily create the one-to-one tracking row. A concurrent creation loses the
/// insert race and reads the surviving row; the original `autonomous_action`
/// is never overwritten.
pub async fn get_or_create(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    autonomous_action: &str,
) -> Result<ResolutionTracking, AppError> {
    sqlx::query(
        r#"
        INSERT INTO ticket_resolutions (id, ticket_id, autonomous_action)
        VALUES ($1, $2, $3)
        ON CONFLICT (ticket_id) DO NOTHING
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(ticket_id)
    .bind(autonomous_action)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query_as::<_, ResolutionRow>(&format!(
        "SELECT {RESOLUTION_COLUMNS} FROM ticket_resolutions WHERE ticket_id = $1"
    ))
    .bind(ticket_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into_tracking())
}

pub async fn get(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
) -> Result<Option<ResolutionTracking>, AppError> {
    let row = sqlx::query_as::<_, ResolutionRow>(&format!(
        "SELECT {RESOLUTION_COLUMNS} FROM ticket_resolutions WHERE ticket_id = $1"
    ))
    .bind(ticket_id)
    .fetch_optional(exec)
    .await?;

    Ok(row.map(ResolutionRow::into_tracking))
}

/// Overwrite the latest feedback snapshot. Reopen markers are sticky: once
/// set they survive later positive feedback.
pub async fn record_feedback(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
    confirmed: Option<bool>,
    satisfaction: Option<i32>,
    text: Option<&str>,
    reopen: bool,
    reopen_reason: Option<&str>,
) -> Result<ResolutionTracking, AppError> {
    let row = sqlx::query_as::<_, ResolutionRow>(&format!(
        r#"
        UPDATE ticket_resolutions
        SET resolution_confirmed = $2,
            satisfaction_score = $3,
            feedback_text = $4,
            response_received_at = now(),
            reopened = reopened OR $5,
            reopened_at = CASE WHEN $5 AND NOT reopened THEN now() ELSE reopened_at END,
            reopened_reason = CASE WHEN $5 THEN $6 ELSE reopened_reason END,
            updated_at = now()
        WHERE ticket_id = $1
        RETURNING {RESOLUTION_COLUMNS}
        "#
    ))
    .bind(ticket_id)
    .bind(confirmed)
    .bind(satisfaction)
    .bind(text)
    .bind(reopen)
    .bind(reopen_reason)
    .fetch_one(exec)
    .await?;

    Ok(row.into_tracking())
}

/// Stamp the follow-up request exactly once. Returns false when a previous
/// follow-up already went out or the requester gave feedback on their own,
/// so duplicate scheduled firings stay silent and `response_received_at`
/// never ends up earlier than `followup_sent_at`.
pub async fn mark_followup_sent(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE ticket_resolutions
        SET followup_sent_at = now(), updated_at = now()
        WHERE ticket_id = $1 AND followup_sent_at IS NULL AND response_received_at IS NULL
        "#,
    )
    .bind(ticket_id)
    .execute(exec)
    .await?;

    Ok(result.rows_affected() == 1)
}
