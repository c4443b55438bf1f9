use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use triage_core::actions::{ActionHistoryEntry, ActionParams, ActionType, TicketSnapshot};

use crate::error::AppError;

/// Actor recorded on history rows written by the engine itself.
pub const AUTONOMOUS_ACTOR: &str = "autonomous_agent";

/// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
pub struct ActionHistoryRow {
    id: Uuid,
    ticket_id: Uuid,
    action_type: String,
    action_params: serde_json::Value,
    confidence_score: Option<f64>,
    agent_reasoning: String,
    executed_at: DateTime<Utc>,
    executed_by: String,
    rollback_possible: bool,
    rolled_back: bool,
    rolled_back_at: Option<DateTime<Utc>>,
    rolled_back_by: Option<String>,
    rollback_reason: Option<String>,
    before_state: Option<serde_json::Value>,
    after_state: Option<serde_json::Value>,
}

impl ActionHistoryRow {
    fn into_entry(self) -> Result<ActionHistoryEntry, AppError> {
        let action_type = ActionType::parse(&self.action_type).map_err(|err| {
            AppError::Internal(format!("Corrupt history entry {}: {}", self.id, err))
        })?;
        let action_params: ActionParams =
            serde_json::from_value(self.action_params).map_err(|err| {
                AppError::Internal(format!(
                    "Corrupt action params on history entry {}: {}",
                    self.id, err
                ))
            })?;
        let before_state = parse_snapshot(self.before_state, self.id)?;
        let after_state = parse_snapshot(self.after_state, self.id)?;

        Ok(ActionHistoryEntry {
            id: self.id,
            ticket_id: self.ticket_id,
            action_type,
            action_params,
            confidence_score: self.confidence_score,
            agent_reasoning: self.agent_reasoning,
            executed_at: self.executed_at,
            executed_by: self.executed_by,
            rollback_possible: self.rollback_possible,
            rolled_back: self.rolled_back,
            rolled_back_at: self.rolled_back_at,
            rolled_back_by: self.rolled_back_by,
            rollback_reason: self.rollback_reason,
            before_state,
            after_state,
        })
    }
}

fn parse_snapshot(
    value: Option<serde_json::Value>,
    entry_id: Uuid,
) -> Result<Option<TicketSnapshot>, AppError> {
    value
        .map(|v| {
            serde_json::from_value(v).map_err(|err| {
                AppError::Internal(format!(
                    "Corrupt state snapshot on history entry {entry_id}: {err}"
                ))
            })
        })
        .transpose()
}

const ENTRY_COLUMNS: &str = "id, ticket_id, action_type, action_params, confidence_score, \
     agent_reasoning, executed_at, executed_by, rollback_possible, rolled_back, rolled_back_at, \
     rolled_back_by, rollback_reason, before_state, after_state";

/// Fields for one new ledger row. `rollback_possible` is derived from the
/// action type at creation time.
pub struct NewActionRecord<'a> {
    pub ticket_id: Uuid,
    pub params: &'a ActionParams,
    pub confidence: Option<f64>,
    pub reasoning: &'a str,
    pub before_state: Option<&'a TicketSnapshot>,
    pub after_state: Option<&'a TicketSnapshot>,
}

pub async fn insert_entry(
    exec: impl PgExecutor<'_>,
    record: NewActionRecord<'_>,
) -> Result<Uuid, AppError> {
    let id = Uuid::now_v7();
    let action_type = record.params.action_type();
    let params = serde_json::to_value(record.params)
        .map_err(|e| AppError::Internal(format!("Failed to serialize action params: {e}")))?;
    let before = record
        .before_state
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| AppError::Internal(format!("Failed to serialize before state: {e}")))?;
    let after = record
        .after_state
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| AppError::Internal(format!("Failed to serialize after state: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO action_history
            (id, ticket_id, action_type, action_params, confidence_score, agent_reasoning,
             executed_by, rollback_possible, before_state, after_state)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(id)
    .bind(record.ticket_id)
    .bind(action_type.as_str())
    .bind(&params)
    .bind(record.confidence)
    .bind(record.reasoning)
    .bind(AUTONOMOUS_ACTOR)
    .bind(action_type.rollback_supported())
    .bind(&before)
    .bind(&after)
    .execute(exec)
    .await?;

    Ok(id)
}

pub async fn get_entry(
    exec: impl PgExecutor<'_>,
    entry_id: Uuid,
) -> Result<Option<ActionHistoryEntry>, AppError> {
    let row = sqlx::query_as::<_, ActionHistoryRow>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM action_history WHERE id = $1"
    ))
    .bind(entry_id)
    .fetch_optional(exec)
    .await?;

    match row {
        Some(row) => Ok(Some(row.into_entry()?)),
        None => Ok(None),
    }
}

/// Newest first, matching how operators review a ticket's history.
pub async fn list_for_ticket(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
) -> Result<Vec<ActionHistoryEntry>, AppError> {
    let rows = sqlx::query_as::<_, ActionHistoryRow>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM action_history WHERE ticket_id = $1 ORDER BY executed_at DESC"
    ))
    .bind(ticket_id)
    .fetch_all(exec)
    .await?;

    rows.into_iter().map(|row| row.into_entry()).collect()
}

/// Entries on the same ticket executed after `executed_at` that have not been
/// rolled back. Used to detect whether a rollback target was superseded.
pub async fn newer_active_entries(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
    executed_at: DateTime<Utc>,
    exclude_id: Uuid,
) -> Result<Vec<ActionHistoryEntry>, AppError> {
    let rows = sqlx::query_as::<_, ActionHistoryRow>(&format!(
        r#"
        SELECT {ENTRY_COLUMNS} FROM action_history
        WHERE ticket_id = $1 AND executed_at > $2 AND id <> $3 AND rolled_back = FALSE
        ORDER BY executed_at
        "#
    ))
    .bind(ticket_id)
    .bind(executed_at)
    .bind(exclude_id)
    .fetch_all(exec)
    .await?;

    rows.into_iter().map(|row| row.into_entry()).collect()
}

/// Flip `rolled_back` exactly once. The `WHERE rolled_back = FALSE` guard
/// makes a second rollback of the same entry a no-op at the storage layer,
/// returning false so callers can surface the conflict.
pub async fn mark_rolled_back(
    exec: impl PgExecutor<'_>,
    entry_id: Uuid,
    actor: &str,
    reason: &str,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE action_history
        SET rolled_back = TRUE, rolled_back_at = now(), rolled_back_by = $2, rollback_reason = $3
        WHERE id = $1 AND rolled_back = FALSE
        "#,
    )
    .bind(entry_id)
    .bind(actor)
    .bind(reason)
    .execute(exec)
    .await?;

    Ok(result.rows_affected() == 1)
}
