//! Per-ticket processing pipeline: score the ticket with the AI service,
//! persist the analysis, run the decision policy, execute the chosen action.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use triage_core::actions::ActionType;
use triage_core::policy::{self, PolicyInput};
use triage_core::tickets::AgentAnalysis;

use crate::agent::{AnalyzeRequest, AnalyzeUser};
use crate::engine::executor;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::tickets as tickets_store;

/// Result of one processing run, returned to the caller that triggered it.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessOutcome {
    pub ticket_id: Uuid,
    /// False when the ticket had already been processed and nothing ran
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_history_id: Option<Uuid>,
}

impl ProcessOutcome {
    fn skipped(ticket_id: Uuid) -> Self {
        Self {
            ticket_id,
            executed: false,
            action_type: None,
            success: true,
            action_history_id: None,
        }
    }
}

pub async fn process_ticket(
    state: &AppState,
    ticket_id: Uuid,
) -> Result<ProcessOutcome, AppError> {
    let Some(ticket) = tickets_store::get_ticket(&state.db, ticket_id).await? else {
        return Err(AppError::NotFound {
            resource: format!("ticket {ticket_id}"),
        });
    };

    if ticket.agent_processed {
        tracing::info!(ticket_id = %ticket_id, "Ticket already processed by the scoring service");
        return Ok(ProcessOutcome::skipped(ticket_id));
    }

    let request = AnalyzeRequest {
        ticket_id,
        issue_type: &ticket.issue_type,
        description: ticket.description.as_deref(),
        category: &ticket.category,
        tags: &ticket.tags,
        user: AnalyzeUser {
            id: ticket.requester_id,
            name: ticket.requester_name.as_deref(),
            department: ticket.requester_department.as_deref(),
        },
    };

    let raw = state.agent.analyze(&request).await.map_err(|err| {
        // The ticket stays agent_processed = false for later reprocessing —
        // never silently marked processed.
        tracing::error!(
            ticket_id = %ticket_id,
            error = %err,
            "Scoring service unavailable after retries, leaving ticket unprocessed"
        );
        AppError::Upstream {
            message: format!("Scoring service unavailable: {err}"),
        }
    })?;

    let claimed = tickets_store::mark_agent_processed(&state.db, ticket_id, &raw).await?;
    if !claimed {
        tracing::info!(ticket_id = %ticket_id, "Ticket was processed concurrently, skipping");
        return Ok(ProcessOutcome::skipped(ticket_id));
    }

    let analysis: AgentAnalysis = serde_json::from_value(raw).unwrap_or_else(|err| {
        tracing::warn!(
            ticket_id = %ticket_id,
            error = %err,
            "Scoring payload did not match the expected shape, treating as zero confidence"
        );
        AgentAnalysis::default()
    });

    let confidence = analysis.clamped_confidence();
    let input = PolicyInput {
        confidence,
        recommended_action: analysis.recommended_action.as_deref(),
        resolution_steps: analysis.steps(),
        explanation: analysis.explanation.as_deref(),
        category: &ticket.category,
        description: ticket.description.as_deref(),
        status: ticket.status,
    };
    let decision = policy::decide(&input);
    let action_type = decision.params.action_type();
    tracing::info!(
        ticket_id = %ticket_id,
        action = %action_type,
        confidence,
        "Decision policy selected action"
    );

    let outcome = executor::execute_action(state, ticket_id, &decision, Some(confidence)).await;

    Ok(ProcessOutcome {
        ticket_id,
        executed: true,
        action_type: Some(action_type),
        success: outcome.success,
        action_history_id: outcome.action_history_id,
    })
}
