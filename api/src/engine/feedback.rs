//! Resolution feedback: records whether an autonomous resolution actually
//! worked and drives re-escalation when it did not. Also home of the
//! scheduled follow-up checks fired by the job worker.

use uuid::Uuid;

use triage_core::actions::{ActionParams, ActionType, EscalationPriority};
use triage_core::policy::Decision;
use triage_core::resolution::ResolutionTracking;
use triage_core::tickets::Ticket;

use crate::engine::executor;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{jobs, resolutions, tickets as tickets_store};

pub const DEFAULT_REOPEN_REASON: &str = "User reported the resolution did not work";

/// Recorded when feedback arrives before any autonomous action touched the
/// ticket.
pub const MANUAL_ACTION: &str = "MANUAL";

/// Record user feedback on a resolution. Overwrite-latest semantics: repeated
/// submissions replace the previous snapshot. `confirmed == false` reopens
/// the ticket and sends it back through the escalation path.
pub async fn submit_feedback(
    state: &AppState,
    ticket_id: Uuid,
    confirmed: Option<bool>,
    satisfaction: Option<i32>,
    text: Option<&str>,
) -> Result<(ResolutionTracking, Ticket), AppError> {
    if let Some(score) = satisfaction {
        if !(1..=5).contains(&score) {
            return Err(AppError::Validation {
                message: format!("satisfaction_score must be between 1 and 5, got {score}"),
                field: Some("satisfaction_score".to_string()),
                received: Some(serde_json::json!(score)),
                docs_hint: Some("Rate the resolution from 1 (failed) to 5 (worked perfectly)".to_string()),
            });
        }
    }

    let reopen = confirmed == Some(false);
    let reopen_reason = text
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_REOPEN_REASON)
        .to_string();

    let mut tx = state.db.begin().await?;
    tickets_store::acquire_ticket_lock(&mut *tx, ticket_id).await?;
    if tickets_store::get_ticket(&mut *tx, ticket_id).await?.is_none() {
        return Err(AppError::NotFound {
            resource: format!("ticket {ticket_id}"),
        });
    }

    resolutions::get_or_create(&mut *tx, ticket_id, MANUAL_ACTION).await?;
    let tracking = resolutions::record_feedback(
        &mut *tx,
        ticket_id,
        confirmed,
        satisfaction,
        text,
        reopen,
        reopen.then_some(reopen_reason.as_str()),
    )
    .await?;
    tx.commit().await?;

    if reopen {
        // Feedback loop: a failed resolution re-enters the escalation path.
        let decision = Decision {
            params: ActionParams::Escalate {
                escalation_reason: reopen_reason.clone(),
                priority: EscalationPriority::High,
            },
            reasoning: "Requester reported that the autonomous resolution failed".to_string(),
        };
        let outcome = executor::execute_action(state, ticket_id, &decision, None).await;
        if !outcome.success {
            tracing::error!(
                ticket_id = %ticket_id,
                "Failed to escalate after negative resolution feedback"
            );
        }
    }

    let ticket = tickets_store::get_ticket(&state.db, ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("ticket {ticket_id}"),
        })?;

    Ok((tracking, ticket))
}

/// Scheduled re-verification, fired by the job worker. At-least-once safe:
/// duplicate firings find either a terminal ticket (no-op) or an
/// already-escalated one (the executor skips the duplicate).
pub async fn run_followup_check(
    state: &AppState,
    ticket_id: Uuid,
    kind: &str,
) -> Result<(), AppError> {
    let Some(ticket) = tickets_store::get_ticket(&state.db, ticket_id).await? else {
        tracing::warn!(ticket_id = %ticket_id, "Follow-up check for a missing ticket, skipping");
        return Ok(());
    };

    if ticket.status.is_terminal() {
        if kind == jobs::KIND_RESOLUTION_CHECK {
            request_resolution_feedback(state, &ticket).await?;
        }
        tracing::info!(
            ticket_id = %ticket_id,
            status = %ticket.status,
            "Follow-up check passed, resolution held"
        );
        return Ok(());
    }

    let reason = followup_escalation_reason(kind);
    tracing::info!(
        ticket_id = %ticket_id,
        status = %ticket.status,
        kind,
        "Follow-up check failed, escalating"
    );
    let decision = Decision {
        params: ActionParams::Escalate {
            escalation_reason: reason.to_string(),
            priority: EscalationPriority::High,
        },
        reasoning: format!(
            "Scheduled follow-up found the ticket still '{}'",
            ticket.status
        ),
    };
    let outcome = executor::execute_action(state, ticket_id, &decision, None).await;
    if !outcome.success {
        // Bubble an error so the job stays incomplete and is retried.
        return Err(AppError::Internal(format!(
            "Follow-up escalation failed for ticket {ticket_id}"
        )));
    }

    Ok(())
}

/// One-time feedback request after a held resolution. The followup_sent_at
/// stamp is the idempotence guard against duplicate job firings.
async fn request_resolution_feedback(state: &AppState, ticket: &Ticket) -> Result<(), AppError> {
    let mut conn = state.db.acquire().await?;
    resolutions::get_or_create(&mut conn, ticket.id, ActionType::AutoResolve.as_str()).await?;
    let first_send = resolutions::mark_followup_sent(&mut *conn, ticket.id).await?;
    drop(conn);

    if first_send {
        state.notifier.notify(
            &ticket.requester_id.to_string(),
            &feedback_request_text(ticket),
            None,
        );
    } else {
        tracing::info!(ticket_id = %ticket.id, "Feedback request already sent, skipping");
    }
    Ok(())
}

fn feedback_request_text(ticket: &Ticket) -> String {
    format!(
        "Your ticket '{}' was resolved automatically 24 hours ago. Did the fix work? \
         Reply with a confirmation and a 1-5 rating.",
        ticket.issue_type
    )
}

/// Why a failed check escalates, phrased per job kind.
fn followup_escalation_reason(kind: &str) -> &'static str {
    if kind == jobs::KIND_RESOLUTION_CHECK {
        "solution did not hold"
    } else {
        "Solution did not resolve issue within expected timeframe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_reason_is_phrased_per_job_kind() {
        assert_eq!(
            followup_escalation_reason(jobs::KIND_RESOLUTION_CHECK),
            "solution did not hold"
        );
        assert_eq!(
            followup_escalation_reason(jobs::KIND_FOLLOWUP_CHECK),
            "Solution did not resolve issue within expected timeframe"
        );
    }
}
