use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use triage_core::error::ApiError;
use triage_core::tickets::{CreateTicketRequest, InteractionKind, Ticket, TicketInteraction};

use crate::error::AppError;
use crate::state::AppState;
use crate::store::tickets as tickets_store;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tickets", post(create_ticket))
        .route("/v1/tickets/{ticket_id}", get(get_ticket))
        .route("/v1/tickets/{ticket_id}/interactions", get(list_interactions))
}

fn validate_create(req: &CreateTicketRequest) -> Result<(), AppError> {
    if req.issue_type.trim().is_empty() {
        return Err(AppError::Validation {
            message: "issue_type must not be empty".to_string(),
            field: Some("issue_type".to_string()),
            received: Some(serde_json::Value::String(req.issue_type.clone())),
            docs_hint: Some(
                "issue_type is a short label for the problem, e.g. 'VPN drops hourly'".to_string(),
            ),
        });
    }

    if req.category.trim().is_empty() {
        return Err(AppError::Validation {
            message: "category must not be empty".to_string(),
            field: Some("category".to_string()),
            received: None,
            docs_hint: Some(
                "Use a short category like 'network', 'hardware' or 'other' (the default)"
                    .to_string(),
            ),
        });
    }

    Ok(())
}

/// Open a new ticket
///
/// The ticket starts in status `new` and is not scored until processing is
/// triggered explicitly via POST /v1/tickets/{ticket_id}/process.
#[utoipa::path(
    post,
    path = "/v1/tickets",
    request_body = CreateTicketRequest,
    responses(
        (status = 201, description = "Ticket created", body = Ticket),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "tickets"
)]
pub async fn create_ticket(
    State(state): State<AppState>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_create(&req)?;

    let mut tx = state.db.begin().await?;
    let ticket = tickets_store::insert_ticket(&mut *tx, &req).await?;
    tickets_store::append_interaction(
        &mut *tx,
        ticket.id,
        &req.requester_id.to_string(),
        InteractionKind::UserMessage,
        &format!("Ticket created: {}", ticket.issue_type),
    )
    .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

/// Fetch one ticket
#[utoipa::path(
    get,
    path = "/v1/tickets/{ticket_id}",
    params(("ticket_id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "The ticket", body = Ticket),
        (status = 404, description = "Ticket not found", body = ApiError)
    ),
    tag = "tickets"
)]
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    let ticket = tickets_store::get_ticket(&state.db, ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("ticket {ticket_id}"),
        })?;

    Ok(Json(ticket))
}

/// List a ticket's interaction feed, oldest first
#[utoipa::path(
    get,
    path = "/v1/tickets/{ticket_id}/interactions",
    params(("ticket_id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Interaction feed", body = Vec<TicketInteraction>),
        (status = 404, description = "Ticket not found", body = ApiError)
    ),
    tag = "tickets"
)]
pub async fn list_interactions(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Vec<TicketInteraction>>, AppError> {
    if tickets_store::get_ticket(&state.db, ticket_id).await?.is_none() {
        return Err(AppError::NotFound {
            resource: format!("ticket {ticket_id}"),
        });
    }

    let interactions = tickets_store::list_interactions(&state.db, ticket_id).await?;
    Ok(Json(interactions))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateTicketRequest {
        serde_json::from_value(serde_json::json!({
            "requester_id": "018f6d57-0000-7000-8000-000000000001",
            "issue_type": "VPN drops hourly",
            "description": "Connection drops every hour on the hour",
            "category": "network",
        }))
        .unwrap()
    }

    #[test]
    fn create_validation_rejects_blank_issue_type() {
        let mut req = request();
        req.issue_type = "   ".to_string();
        let err = validate_create(&req).expect_err("blank issue_type must fail");
        match err {
            AppError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("issue_type"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn create_defaults_category_to_other() {
        let req: CreateTicketRequest = serde_json::from_value(serde_json::json!({
            "requester_id": "018f6d57-0000-7000-8000-000000000001",
            "issue_type": "Printer jam",
        }))
        .unwrap();
        assert_eq!(req.category, "other");
        assert!(validate_create(&req).is_ok());
    }
}
