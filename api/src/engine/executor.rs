//! Applies a decided action to a ticket: mutates status inside a per-ticket
//! lock, captures before/after snapshots, and writes exactly one action
//! history row in the same transaction as the mutation. Notifications go out
//! only after commit.

use chrono::Utc;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use triage_core::actions::{ActionParams, ActionType, EscalationPriority, TicketSnapshot};
use triage_core::policy::Decision;
use triage_core::tickets::{InteractionKind, Ticket, TicketStatus};

use crate::error::AppError;
use crate::notify::SUPPORT_QUEUE;
use crate::state::AppState;
use crate::store::history::{self, AUTONOMOUS_ACTOR, NewActionRecord};
use crate::store::{jobs, kb, resolutions, tickets as tickets_store};

/// Outcome of one action execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub action_type: ActionType,
    /// Ledger row written for this execution; absent for no-ops and failures.
    pub action_history_id: Option<Uuid>,
    /// The ticket was already in the target state; nothing was recorded.
    pub no_op: bool,
}

/// A notification held back until the transaction commits.
struct Outgoing {
    recipient: String,
    text: String,
}

/// Dispatch boundary for autonomous actions. Any failure below is caught,
/// logged with full ticket/action context, and surfaced as success=false;
/// the per-action transaction guarantees no partially-written ledger row.
pub async fn execute_action(
    state: &AppState,
    ticket_id: Uuid,
    decision: &Decision,
    confidence: Option<f64>,
) -> ExecutionOutcome {
    let action_type = decision.params.action_type();
    match execute(state, ticket_id, decision, confidence).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(
                ticket_id = %ticket_id,
                action = %action_type,
                error = ?err,
                "Autonomous action failed"
            );
            ExecutionOutcome {
                success: false,
                action_type,
                action_history_id: None,
                no_op: false,
            }
        }
    }
}

pub async fn execute(
    state: &AppState,
    ticket_id: Uuid,
    decision: &Decision,
    confidence: Option<f64>,
) -> Result<ExecutionOutcome, AppError> {
    let mut tx = state.db.begin().await?;
    tickets_store::acquire_ticket_lock(&mut *tx, ticket_id).await?;
    let ticket = tickets_store::get_ticket(&mut *tx, ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("ticket {ticket_id}"),
        })?;

    let (outcome, messages) = match &decision.params {
        ActionParams::AutoResolve { resolution_steps } => {
            run_auto_resolve(&mut tx, &ticket, resolution_steps, decision, confidence).await?
        }
        ActionParams::Escalate {
            escalation_reason,
            priority,
        } => run_escalate(&mut tx, &ticket, escalation_reason, *priority, decision, confidence).await?,
        ActionParams::RequestClarification {
            missing_fields,
            reason,
        } => {
            run_request_clarification(&mut tx, &ticket, missing_fields, reason, decision, confidence)
                .await?
        }
        ActionParams::AssignToTeam { team } => {
            run_assign_to_team(&mut tx, &ticket, team, decision, confidence).await?
        }
        ActionParams::ScheduleFollowup {
            followup_in_hours,
            tentative_steps,
        } => {
            run_schedule_followup(
                &mut tx,
                &ticket,
                *followup_in_hours,
                tentative_steps,
                decision,
                confidence,
            )
            .await?
        }
        ActionParams::CreateKbArticle {} => {
            run_create_kb_article(&mut tx, &ticket, decision, confidence).await?
        }
    };

    tx.commit().await?;

    for message in messages {
        state.notifier.notify(&message.recipient, &message.text, None);
    }

    if outcome.no_op {
        tracing::info!(
            ticket_id = %ticket_id,
            action = %outcome.action_type,
            "Action skipped, ticket already in target state"
        );
    } else {
        tracing::info!(
            ticket_id = %ticket_id,
            action = %outcome.action_type,
            history_id = ?outcome.action_history_id,
            "Executed autonomous action"
        );
    }

    Ok(outcome)
}

fn snapshot(ticket: &Ticket) -> TicketSnapshot {
    TicketSnapshot {
        status: ticket.status,
        assigned_to: ticket.assigned_to.clone(),
    }
}

fn no_op(action_type: ActionType) -> (ExecutionOutcome, Vec<Outgoing>) {
    (
        ExecutionOutcome {
            success: true,
            action_type,
            action_history_id: None,
            no_op: true,
        },
        Vec::new(),
    )
}

fn done(action_type: ActionType, entry_id: Uuid, messages: Vec<Outgoing>) -> (ExecutionOutcome, Vec<Outgoing>) {
    (
        ExecutionOutcome {
            success: true,
            action_type,
            action_history_id: Some(entry_id),
            no_op: false,
        },
        messages,
    )
}

async fn run_auto_resolve(
    tx: &mut Transaction<'_, Postgres>,
    ticket: &Ticket,
    steps: &[String],
    decision: &Decision,
    confidence: Option<f64>,
) -> Result<(ExecutionOutcome, Vec<Outgoing>), AppError> {
    // At-least-once delivery: a second resolve must not write a duplicate
    // ledger row with a contradictory before-state.
    if ticket.status.is_terminal() {
        return Ok(no_op(ActionType::AutoResolve));
    }

    let before = snapshot(ticket);
    tickets_store::update_status(&mut **tx, ticket.id, TicketStatus::Resolved).await?;
    let after = TicketSnapshot {
        status: TicketStatus::Resolved,
        assigned_to: ticket.assigned_to.clone(),
    };

    let entry_id = history::insert_entry(
        &mut **tx,
        NewActionRecord {
            ticket_id: ticket.id,
            params: &decision.params,
            confidence,
            reasoning: &decision.reasoning,
            before_state: Some(&before),
            after_state: Some(&after),
        },
    )
    .await?;

    let steps_text = resolution_summary(steps);
    tickets_store::append_interaction(
        &mut **tx,
        ticket.id,
        AUTONOMOUS_ACTOR,
        InteractionKind::AgentResponse,
        &format!("Auto-resolved by the support assistant.\n\nResolution:\n{steps_text}"),
    )
    .await?;

    resolutions::get_or_create(&mut **tx, ticket.id, ActionType::AutoResolve.as_str()).await?;
    kb::upsert_article(&mut **tx, ticket, &steps_text).await?;

    // Delayed re-verification that the resolution held.
    let run_at = Utc::now() + chrono::Duration::hours(i64::from(
        triage_core::policy::DEFAULT_FOLLOWUP_HOURS,
    ));
    jobs::schedule(
        &mut **tx,
        ticket.id,
        jobs::KIND_RESOLUTION_CHECK,
        &serde_json::json!({}),
        run_at,
    )
    .await?;

    let messages = vec![Outgoing {
        recipient: ticket.requester_id.to_string(),
        text: format!(
            "Your ticket '{}' was resolved automatically.\n\nResolution:\n{steps_text}\n\n\
             Reply to this message if the issue is not fixed.",
            ticket.issue_type
        ),
    }];

    Ok(done(ActionType::AutoResolve, entry_id, messages))
}

async fn run_escalate(
    tx: &mut Transaction<'_, Postgres>,
    ticket: &Ticket,
    reason: &str,
    priority: EscalationPriority,
    decision: &Decision,
    confidence: Option<f64>,
) -> Result<(ExecutionOutcome, Vec<Outgoing>), AppError> {
    if ticket.status == TicketStatus::Escalated {
        return Ok(no_op(ActionType::Escalate));
    }

    let before = snapshot(ticket);
    tickets_store::update_status(&mut **tx, ticket.id, TicketStatus::Escalated).await?;
    let after = TicketSnapshot {
        status: TicketStatus::Escalated,
        assigned_to: ticket.assigned_to.clone(),
    };

    let entry_id = history::insert_entry(
        &mut **tx,
        NewActionRecord {
            ticket_id: ticket.id,
            params: &decision.params,
            confidence,
            reasoning: &decision.reasoning,
            before_state: Some(&before),
            after_state: Some(&after),
        },
    )
    .await?;

    tickets_store::append_interaction(
        &mut **tx,
        ticket.id,
        AUTONOMOUS_ACTOR,
        InteractionKind::AgentResponse,
        &format!("Escalated to human support: {reason}"),
    )
    .await?;

    let messages = vec![
        Outgoing {
            recipient: ticket.requester_id.to_string(),
            text: format!(
                "Your ticket '{}' was escalated to human support: {reason}",
                ticket.issue_type
            ),
        },
        Outgoing {
            recipient: SUPPORT_QUEUE.to_string(),
            text: format!(
                "Ticket {} escalated ({} priority): {reason}",
                ticket.id,
                priority_label(priority)
            ),
        },
    ];

    Ok(done(ActionType::Escalate, entry_id, messages))
}

async fn run_request_clarification(
    tx: &mut Transaction<'_, Postgres>,
    ticket: &Ticket,
    missing_fields: &[String],
    reason: &str,
    decision: &Decision,
    confidence: Option<f64>,
) -> Result<(ExecutionOutcome, Vec<Outgoing>), AppError> {
    if ticket.status == TicketStatus::PendingClarification {
        return Ok(no_op(ActionType::RequestClarification));
    }

    let before = snapshot(ticket);
    tickets_store::update_status(&mut **tx, ticket.id, TicketStatus::PendingClarification).await?;
    let after = TicketSnapshot {
        status: TicketStatus::PendingClarification,
        assigned_to: ticket.assigned_to.clone(),
    };

    let entry_id = history::insert_entry(
        &mut **tx,
        NewActionRecord {
            ticket_id: ticket.id,
            params: &decision.params,
            confidence,
            reasoning: &decision.reasoning,
            before_state: Some(&before),
            after_state: Some(&after),
        },
    )
    .await?;

    let message = clarification_message(missing_fields, reason);
    tickets_store::append_interaction(
        &mut **tx,
        ticket.id,
        AUTONOMOUS_ACTOR,
        InteractionKind::Clarification,
        &message,
    )
    .await?;

    let messages = vec![Outgoing {
        recipient: ticket.requester_id.to_string(),
        text: message,
    }];

    Ok(done(ActionType::RequestClarification, entry_id, messages))
}

async fn run_assign_to_team(
    tx: &mut Transaction<'_, Postgres>,
    ticket: &Ticket,
    team: &str,
    decision: &Decision,
    confidence: Option<f64>,
) -> Result<(ExecutionOutcome, Vec<Outgoing>), AppError> {
    if ticket.status == TicketStatus::Assigned && ticket.assigned_to.as_deref() == Some(team) {
        return Ok(no_op(ActionType::AssignToTeam));
    }

    let before = snapshot(ticket);
    tickets_store::update_assignment(&mut **tx, ticket.id, TicketStatus::Assigned, Some(team))
        .await?;
    let after = TicketSnapshot {
        status: TicketStatus::Assigned,
        assigned_to: Some(team.to_string()),
    };

    let entry_id = history::insert_entry(
        &mut **tx,
        NewActionRecord {
            ticket_id: ticket.id,
            params: &decision.params,
            confidence,
            reasoning: &decision.reasoning,
            before_state: Some(&before),
            after_state: Some(&after),
        },
    )
    .await?;

    tickets_store::append_interaction(
        &mut **tx,
        ticket.id,
        AUTONOMOUS_ACTOR,
        InteractionKind::AgentResponse,
        &format!("Assigned to {team}"),
    )
    .await?;

    Ok(done(ActionType::AssignToTeam, entry_id, Vec::new()))
}

async fn run_schedule_followup(
    tx: &mut Transaction<'_, Postgres>,
    ticket: &Ticket,
    followup_in_hours: u32,
    tentative_steps: &[String],
    decision: &Decision,
    confidence: Option<f64>,
) -> Result<(ExecutionOutcome, Vec<Outgoing>), AppError> {
    // No ticket mutation: the tentative fix is sent to the requester and the
    // re-check happens when the job fires.
    let params = serde_json::to_value(&decision.params)
        .map_err(|e| AppError::Internal(format!("Failed to serialize follow-up params: {e}")))?;
    let run_at = Utc::now() + chrono::Duration::hours(i64::from(followup_in_hours.max(1)));
    jobs::schedule(&mut **tx, ticket.id, jobs::KIND_FOLLOWUP_CHECK, &params, run_at).await?;

    let entry_id = history::insert_entry(
        &mut **tx,
        NewActionRecord {
            ticket_id: ticket.id,
            params: &decision.params,
            confidence,
            reasoning: &decision.reasoning,
            before_state: None,
            after_state: None,
        },
    )
    .await?;

    let message = followup_message(tentative_steps, followup_in_hours);
    tickets_store::append_interaction(
        &mut **tx,
        ticket.id,
        AUTONOMOUS_ACTOR,
        InteractionKind::AgentResponse,
        &message,
    )
    .await?;

    let messages = vec![Outgoing {
        recipient: ticket.requester_id.to_string(),
        text: message,
    }];

    Ok(done(ActionType::ScheduleFollowup, entry_id, messages))
}

async fn run_create_kb_article(
    tx: &mut Transaction<'_, Postgres>,
    ticket: &Ticket,
    decision: &Decision,
    confidence: Option<f64>,
) -> Result<(ExecutionOutcome, Vec<Outgoing>), AppError> {
    let resolution = ticket
        .agent_response
        .as_ref()
        .map(|analysis| analysis.steps().join("\n"))
        .filter(|steps| !steps.is_empty())
        .or_else(|| {
            ticket
                .agent_response
                .as_ref()
                .and_then(|analysis| analysis.explanation.clone())
        })
        .unwrap_or_else(|| "See the ticket's interaction feed for the resolution.".to_string());

    kb::upsert_article(&mut **tx, ticket, &resolution).await?;

    let entry_id = history::insert_entry(
        &mut **tx,
        NewActionRecord {
            ticket_id: ticket.id,
            params: &decision.params,
            confidence,
            reasoning: &decision.reasoning,
            before_state: None,
            after_state: None,
        },
    )
    .await?;

    Ok(done(ActionType::CreateKbArticle, entry_id, Vec::new()))
}

fn priority_label(priority: EscalationPriority) -> &'static str {
    match priority {
        EscalationPriority::Normal => "normal",
        EscalationPriority::High => "high",
    }
}

fn resolution_summary(steps: &[String]) -> String {
    if steps.is_empty() {
        "No steps provided".to_string()
    } else {
        steps.join("\n")
    }
}

fn clarification_message(missing_fields: &[String], reason: &str) -> String {
    if missing_fields.is_empty() {
        format!("More information is needed to act on this ticket: {reason}")
    } else {
        format!(
            "More information is needed to act on this ticket: {reason}\n\nPlease provide: {}",
            missing_fields.join(", ")
        )
    }
}

fn followup_message(steps: &[String], hours: u32) -> String {
    if steps.is_empty() {
        format!("A follow-up check is scheduled in {hours} hours.")
    } else {
        format!(
            "Please try the following fix:\n{}\n\nWe will check back in {hours} hours and \
             escalate if the issue persists.",
            steps.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_summary_falls_back_when_no_steps() {
        assert_eq!(resolution_summary(&[]), "No steps provided");
        assert_eq!(
            resolution_summary(&["restart client".to_string(), "update driver".to_string()]),
            "restart client\nupdate driver"
        );
    }

    #[test]
    fn clarification_message_lists_missing_fields() {
        let message = clarification_message(
            &["description".to_string(), "category".to_string()],
            "Required fields are missing",
        );
        assert!(message.contains("description, category"));

        let generic = clarification_message(&[], "Confidence 0.20 is below the actionable threshold 0.50");
        assert!(!generic.contains("Please provide"));
    }

    #[test]
    fn followup_message_includes_steps_and_window() {
        let message = followup_message(&["flush dns cache".to_string()], 24);
        assert!(message.contains("flush dns cache"));
        assert!(message.contains("24 hours"));
    }
}
