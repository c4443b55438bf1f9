//! Reverses a previously executed autonomous action from its recorded
//! before-state snapshot. Rollback never re-derives ticket state by inverting
//! business logic — it restores the snapshot verbatim. The history flag flip
//! and the ticket mutation commit atomically or not at all.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use triage_core::actions::{self, ActionType, TicketSnapshot};
use triage_core::tickets::{InteractionKind, TicketStatus};

use crate::error::AppError;
use crate::state::AppState;
use crate::store::{history, jobs, tickets as tickets_store};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RollbackOutcome {
    pub success: bool,
    pub ticket_id: Uuid,
    pub action_type: ActionType,
}

/// Roll back one history entry. State-machine rules enforced here:
/// an entry rolls back at most once, only rollback-eligible action types are
/// accepted, and a later action that wrote the same fields blocks the
/// rollback unless `force` is set. Authorization is the caller's concern.
pub async fn execute_rollback(
    state: &AppState,
    entry_id: Uuid,
    actor: &str,
    reason: &str,
    force: bool,
) -> Result<RollbackOutcome, AppError> {
    let mut tx = state.db.begin().await?;

    let entry = history::get_entry(&mut *tx, entry_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("action history entry {entry_id}"),
        })?;

    tickets_store::acquire_ticket_lock(&mut *tx, entry.ticket_id).await?;

    if entry.rolled_back {
        return Err(AppError::RollbackConflict {
            message: "This action was already rolled back".to_string(),
        });
    }
    if !entry.action_type.rollback_supported() {
        return Err(AppError::InvalidAction {
            message: format!(
                "Action type {} does not support rollback",
                entry.action_type
            ),
        });
    }

    let ticket = tickets_store::get_ticket(&mut *tx, entry.ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("ticket {}", entry.ticket_id),
        })?;

    // Restoring an old snapshot over a newer action's write would silently
    // clobber it. Detect and reject unless the operator forces it.
    if !force {
        let newer =
            history::newer_active_entries(&mut *tx, entry.ticket_id, entry.executed_at, entry.id)
                .await?;
        if let Some(conflicting) = newer
            .iter()
            .find(|later| actions::supersedes(entry.action_type, later.action_type))
        {
            return Err(AppError::RollbackConflict {
                message: format!(
                    "A later action ({} at {}) modified the same ticket fields; \
                     pass force=true to roll back anyway",
                    conflicting.action_type, conflicting.executed_at
                ),
            });
        }
    }

    match entry.action_type {
        ActionType::AutoResolve => {
            let status = restored_status(entry.action_type, entry.before_state.as_ref());
            tickets_store::update_status(&mut *tx, ticket.id, status).await?;
        }
        ActionType::Escalate => {
            let status = restored_status(entry.action_type, entry.before_state.as_ref());
            tickets_store::update_status(&mut *tx, ticket.id, status).await?;
        }
        ActionType::AssignToTeam => match &entry.before_state {
            Some(snapshot) => {
                tickets_store::update_assignment(
                    &mut *tx,
                    ticket.id,
                    snapshot.status,
                    snapshot.assigned_to.as_deref(),
                )
                .await?;
            }
            None => {
                // No snapshot: clear the assignment, leave status untouched.
                tickets_store::update_assigned_to(&mut *tx, ticket.id, None).await?;
            }
        },
        ActionType::ScheduleFollowup => {
            let cancelled =
                jobs::cancel_pending(&mut *tx, ticket.id, jobs::KIND_FOLLOWUP_CHECK).await?;
            tracing::info!(
                ticket_id = %ticket.id,
                cancelled,
                "Cancelled pending follow-up checks"
            );
        }
        ActionType::RequestClarification | ActionType::CreateKbArticle => {
            return Err(AppError::InvalidAction {
                message: format!(
                    "Action type {} does not support rollback",
                    entry.action_type
                ),
            });
        }
    }

    tickets_store::append_interaction(
        &mut *tx,
        ticket.id,
        actor,
        InteractionKind::AgentResponse,
        &rollback_note(entry.action_type, reason),
    )
    .await?;

    let marked = history::mark_rolled_back(&mut *tx, entry.id, actor, reason).await?;
    if !marked {
        // Lost a race with a concurrent rollback; the transaction is dropped
        // and the ticket mutation above never commits.
        return Err(AppError::RollbackConflict {
            message: "This action was already rolled back".to_string(),
        });
    }

    tx.commit().await?;

    tracing::info!(
        ticket_id = %ticket.id,
        entry_id = %entry.id,
        action = %entry.action_type,
        actor,
        "Rolled back autonomous action"
    );

    Ok(RollbackOutcome {
        success: true,
        ticket_id: ticket.id,
        action_type: entry.action_type,
    })
}

/// Status to restore for status-mutating actions. Falls back to a safe prior
/// status when the entry predates snapshot capture.
fn restored_status(action: ActionType, before: Option<&TicketSnapshot>) -> TicketStatus {
    if let Some(snapshot) = before {
        return snapshot.status;
    }
    match action {
        ActionType::Escalate => TicketStatus::New,
        _ => TicketStatus::InProgress,
    }
}

fn rollback_note(action: ActionType, reason: &str) -> String {
    match action {
        ActionType::AutoResolve => format!(
            "Auto-resolution was rolled back.\n\nReason: {reason}\n\n\
             Ticket reopened for manual review."
        ),
        ActionType::AssignToTeam => format!("Team assignment was rolled back.\n\nReason: {reason}"),
        ActionType::Escalate => format!("Escalation was rolled back.\n\nReason: {reason}"),
        ActionType::ScheduleFollowup => {
            format!("Scheduled follow-up was cancelled.\n\nReason: {reason}")
        }
        _ => format!("Action was rolled back.\n\nReason: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restored_status_prefers_the_snapshot() {
        let snapshot = TicketSnapshot {
            status: TicketStatus::InProgress,
            assigned_to: None,
        };
        assert_eq!(
            restored_status(ActionType::AutoResolve, Some(&snapshot)),
            TicketStatus::InProgress
        );
        assert_eq!(
            restored_status(ActionType::Escalate, Some(&snapshot)),
            TicketStatus::InProgress
        );
    }

    #[test]
    fn restored_status_defaults_differ_per_action() {
        assert_eq!(
            restored_status(ActionType::AutoResolve, None),
            TicketStatus::InProgress
        );
        assert_eq!(restored_status(ActionType::Escalate, None), TicketStatus::New);
    }

    #[test]
    fn rollback_note_names_the_action() {
        assert!(rollback_note(ActionType::AutoResolve, "wrong fix").contains("Auto-resolution"));
        assert!(rollback_note(ActionType::Escalate, "noise").contains("Escalation"));
    }
}
