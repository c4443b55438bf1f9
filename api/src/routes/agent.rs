use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use uuid::Uuid;

use triage_core::error::ApiError;

use crate::engine::process::{self, ProcessOutcome};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/tickets/{ticket_id}/process", post(process_ticket))
}

/// Run the autonomous engine against one ticket
///
/// Scores the ticket with the AI service, runs the decision policy and
/// executes the chosen action. A ticket that was already processed is a
/// no-op; a scoring outage leaves the ticket unprocessed so the call can be
/// retried later.
#[utoipa::path(
    post,
    path = "/v1/tickets/{ticket_id}/process",
    params(("ticket_id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Processing outcome", body = ProcessOutcome),
        (status = 404, description = "Ticket not found", body = ApiError),
        (status = 502, description = "Scoring service unavailable", body = ApiError)
    ),
    tag = "agent"
)]
pub async fn process_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<ProcessOutcome>, AppError> {
    let outcome = process::process_ticket(&state, ticket_id).await?;
    Ok(Json(outcome))
}
