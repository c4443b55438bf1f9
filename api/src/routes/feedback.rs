use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use triage_core::error::ApiError;
use triage_core::resolution::ResolutionTracking;
use triage_core::tickets::TicketStatus;

use crate::engine::feedback;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/v1/tickets/{ticket_id}/resolution-feedback",
        post(submit_resolution_feedback),
    )
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolutionFeedbackRequest {
    /// Did the resolution work? false reopens and re-escalates the ticket
    #[serde(default)]
    pub resolution_confirmed: Option<bool>,
    /// Satisfaction rating, 1-5
    #[serde(default)]
    pub satisfaction_score: Option<i32>,
    #[serde(default)]
    pub feedback_text: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResolutionFeedbackResponse {
    pub ticket_status: TicketStatus,
    /// Derived success signal; null while the outcome is unknown
    pub was_successful: Option<bool>,
    /// Latest feedback snapshot, including the owning ticket_id
    #[serde(flatten)]
    pub tracking: ResolutionTracking,
}

/// Record the requester's verdict on a resolution
///
/// Repeated submissions overwrite the previous feedback snapshot. A negative
/// confirmation reopens the ticket and escalates it back to human support.
#[utoipa::path(
    post,
    path = "/v1/tickets/{ticket_id}/resolution-feedback",
    params(("ticket_id" = Uuid, Path, description = "Ticket ID")),
    request_body = ResolutionFeedbackRequest,
    responses(
        (status = 200, description = "Feedback recorded", body = ResolutionFeedbackResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Ticket not found", body = ApiError)
    ),
    tag = "feedback"
)]
pub async fn submit_resolution_feedback(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<ResolutionFeedbackRequest>,
) -> Result<Json<ResolutionFeedbackResponse>, AppError> {
    let (tracking, ticket) = feedback::submit_feedback(
        &state,
        ticket_id,
        req.resolution_confirmed,
        req.satisfaction_score,
        req.feedback_text.as_deref(),
    )
    .await?;

    Ok(Json(ResolutionFeedbackResponse {
        ticket_status: ticket.status,
        was_successful: tracking.was_successful(),
        tracking,
    }))
}
