use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use triage_core::actions::ActionHistoryEntry;
use triage_core::error::ApiError;

use crate::engine::rollback::{self, RollbackOutcome};
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{history, tickets as tickets_store};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tickets/{ticket_id}/actions", get(list_action_history))
        .route("/v1/actions/{action_history_id}/rollback", post(rollback_action))
}

/// A ticket's autonomous action ledger with rollback status
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionHistoryResponse {
    pub ticket_id: Uuid,
    pub total_actions: usize,
    pub action_history: Vec<ActionHistoryEntry>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RollbackRequest {
    /// Operator performing the rollback (authorization happens upstream)
    pub actor: String,
    pub reason: String,
    /// Roll back even when a later action modified the same fields
    #[serde(default)]
    pub force: bool,
}

/// List all autonomous actions taken on a ticket, newest first
#[utoipa::path(
    get,
    path = "/v1/tickets/{ticket_id}/actions",
    params(("ticket_id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Action history", body = ActionHistoryResponse),
        (status = 404, description = "Ticket not found", body = ApiError)
    ),
    tag = "actions"
)]
pub async fn list_action_history(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<ActionHistoryResponse>, AppError> {
    if tickets_store::get_ticket(&state.db, ticket_id).await?.is_none() {
        return Err(AppError::NotFound {
            resource: format!("ticket {ticket_id}"),
        });
    }

    let entries = history::list_for_ticket(&state.db, ticket_id).await?;
    Ok(Json(ActionHistoryResponse {
        ticket_id,
        total_actions: entries.len(),
        action_history: entries,
    }))
}

/// Roll back one autonomous action
///
/// Restores the ticket fields recorded in the entry's before-state snapshot
/// and marks the entry rolled back. Each entry can be rolled back at most
/// once; clarification requests and knowledge-base articles are never
/// rollback-eligible.
#[utoipa::path(
    post,
    path = "/v1/actions/{action_history_id}/rollback",
    params(("action_history_id" = Uuid, Path, description = "Action history entry ID")),
    request_body = RollbackRequest,
    responses(
        (status = 200, description = "Action rolled back", body = RollbackOutcome),
        (status = 400, description = "Action type not rollback-eligible", body = ApiError),
        (status = 404, description = "Entry not found", body = ApiError),
        (status = 409, description = "Already rolled back or superseded", body = ApiError)
    ),
    tag = "actions"
)]
pub async fn rollback_action(
    State(state): State<AppState>,
    Path(action_history_id): Path<Uuid>,
    Json(req): Json<RollbackRequest>,
) -> Result<Json<RollbackOutcome>, AppError> {
    validate_rollback(&req)?;

    let outcome =
        rollback::execute_rollback(&state, action_history_id, &req.actor, &req.reason, req.force)
            .await?;
    Ok(Json(outcome))
}

fn validate_rollback(req: &RollbackRequest) -> Result<(), AppError> {
    if req.actor.trim().is_empty() {
        return Err(AppError::Validation {
            message: "actor must not be empty".to_string(),
            field: Some("actor".to_string()),
            received: None,
            docs_hint: Some("Identify the operator performing the rollback".to_string()),
        });
    }
    if req.reason.trim().is_empty() {
        return Err(AppError::Validation {
            message: "reason must not be empty".to_string(),
            field: Some("reason".to_string()),
            received: None,
            docs_hint: Some(
                "The reason is recorded on the history entry and shown to the ticket owner"
                    .to_string(),
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_request_requires_actor_and_reason() {
        let req = RollbackRequest {
            actor: " ".to_string(),
            reason: "wrong fix".to_string(),
            force: false,
        };
        assert!(validate_rollback(&req).is_err());

        let req = RollbackRequest {
            actor: "ops@example.com".to_string(),
            reason: "".to_string(),
            force: false,
        };
        assert!(validate_rollback(&req).is_err());

        let req = RollbackRequest {
            actor: "ops@example.com".to_string(),
            reason: "wrong fix".to_string(),
            force: false,
        };
        assert!(validate_rollback(&req).is_ok());
    }

    #[test]
    fn force_defaults_to_false_on_the_wire() {
        let req: RollbackRequest = serde_json::from_value(serde_json::json!({
            "actor": "ops@example.com",
            "reason": "wrong fix",
        }))
        .unwrap();
        assert!(!req.force);
    }
}
