use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use triage_core::tickets::{
    AgentAnalysis, CreateTicketRequest, InteractionKind, Ticket, TicketInteraction, TicketStatus,
};

use crate::error::AppError;

/// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
pub struct TicketRow {
    id: Uuid,
    requester_id: Uuid,
    requester_name: Option<String>,
    requester_department: Option<String>,
    issue_type: String,
    status: String,
    description: Option<String>,
    category: String,
    tags: serde_json::Value,
    assigned_to: Option<String>,
    agent_response: Option<serde_json::Value>,
    agent_processed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TicketRow {
    fn into_ticket(self) -> Result<Ticket, AppError> {
        let status = TicketStatus::parse(&self.status).map_err(|err| {
            AppError::Internal(format!("Corrupt status on ticket {}: {}", self.id, err))
        })?;
        let tags: Vec<String> = serde_json::from_value(self.tags).unwrap_or_default();
        // The raw payload is kept verbatim in the column; the typed view is
        // best-effort and degrades to None on shape drift.
        let agent_response = self
            .agent_response
            .and_then(|value| serde_json::from_value::<AgentAnalysis>(value).ok());

        Ok(Ticket {
            id: self.id,
            requester_id: self.requester_id,
            requester_name: self.requester_name,
            requester_department: self.requester_department,
            issue_type: self.issue_type,
            status,
            description: self.description,
            category: self.category,
            tags,
            assigned_to: self.assigned_to,
            agent_response,
            agent_processed: self.agent_processed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const TICKET_COLUMNS: &str = "id, requester_id, requester_name, requester_department, issue_type, \
     status, description, category, tags, assigned_to, agent_response, agent_processed, \
     created_at, updated_at";

/// Serialize all engine work on one ticket. Advisory and transaction-scoped:
/// released automatically at commit or rollback.
pub async fn acquire_ticket_lock(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(ticket_id)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn insert_ticket(
    exec: impl PgExecutor<'_>,
    req: &CreateTicketRequest,
) -> Result<Ticket, AppError> {
    let tags = serde_json::to_value(&req.tags)
        .map_err(|e| AppError::Internal(format!("Failed to serialize tags: {e}")))?;

    let row = sqlx::query_as::<_, TicketRow>(&format!(
        r#"
        INSERT INTO tickets
            (id, requester_id, requester_name, requester_department, issue_type, status,
             description, category, tags)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {TICKET_COLUMNS}
        "#
    ))
    .bind(Uuid::now_v7())
    .bind(req.requester_id)
    .bind(&req.requester_name)
    .bind(&req.requester_department)
    .bind(&req.issue_type)
    .bind(TicketStatus::New.as_str())
    .bind(&req.description)
    .bind(&req.category)
    .bind(&tags)
    .fetch_one(exec)
    .await?;

    row.into_ticket()
}

pub async fn get_ticket(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
) -> Result<Option<Ticket>, AppError> {
    let row = sqlx::query_as::<_, TicketRow>(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
    ))
    .bind(ticket_id)
    .fetch_optional(exec)
    .await?;

    match row {
        Some(row) => Ok(Some(row.into_ticket()?)),
        None => Ok(None),
    }
}

pub async fn update_status(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
    status: TicketStatus,
) -> Result<(), AppError> {
    sqlx::query("UPDATE tickets SET status = $2, updated_at = now() WHERE id = $1")
        .bind(ticket_id)
        .bind(status.as_str())
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn update_assignment(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
    status: TicketStatus,
    assigned_to: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE tickets SET status = $2, assigned_to = $3, updated_at = now() WHERE id = $1",
    )
    .bind(ticket_id)
    .bind(status.as_str())
    .bind(assigned_to)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn update_assigned_to(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
    assigned_to: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query("UPDATE tickets SET assigned_to = $2, updated_at = now() WHERE id = $1")
        .bind(ticket_id)
        .bind(assigned_to)
        .execute(exec)
        .await?;
    Ok(())
}

/// Store the raw scoring payload and flip `agent_processed`. Compare-and-set:
/// returns false when another worker already processed the ticket, so
/// concurrent processing attempts cannot double-execute.
pub async fn mark_agent_processed(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
    agent_response: &serde_json::Value,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE tickets
        SET agent_response = $2, agent_processed = TRUE, updated_at = now()
        WHERE id = $1 AND agent_processed = FALSE
        "#,
    )
    .bind(ticket_id)
    .bind(agent_response)
    .execute(exec)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn append_interaction(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
    actor: &str,
    kind: InteractionKind,
    content: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO ticket_interactions (id, ticket_id, actor, kind, content)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(ticket_id)
    .bind(actor)
    .bind(kind.as_str())
    .bind(content)
    .execute(exec)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct InteractionRow {
    id: Uuid,
    ticket_id: Uuid,
    actor: String,
    kind: String,
    content: String,
    created_at: DateTime<Utc>,
}

pub async fn list_interactions(
    exec: impl PgExecutor<'_>,
    ticket_id: Uuid,
) -> Result<Vec<TicketInteraction>, AppError> {
    let rows = sqlx::query_as::<_, InteractionRow>(
        r#"
        SELECT id, ticket_id, actor, kind, content, created_at
        FROM ticket_interactions
        WHERE ticket_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(ticket_id)
    .fetch_all(exec)
    .await?;

    rows.into_iter()
        .map(|row| {
            let kind = InteractionKind::parse(&row.kind).map_err(|err| {
                AppError::Internal(format!("Corrupt interaction {}: {}", row.id, err))
            })?;
            Ok(TicketInteraction {
                id: row.id,
                ticket_id: row.ticket_id,
                actor: row.actor,
                kind,
                content: row.content,
                created_at: row.created_at,
            })
        })
        .collect()
}
