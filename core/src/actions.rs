use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::tickets::TicketStatus;

/// The six remediation actions the engine can take. There is no "no action"
/// outcome — the decision policy is total over these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    AutoResolve,
    Escalate,
    RequestClarification,
    AssignToTeam,
    ScheduleFollowup,
    CreateKbArticle,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoResolve => "AUTO_RESOLVE",
            Self::Escalate => "ESCALATE",
            Self::RequestClarification => "REQUEST_CLARIFICATION",
            Self::AssignToTeam => "ASSIGN_TO_TEAM",
            Self::ScheduleFollowup => "SCHEDULE_FOLLOWUP",
            Self::CreateKbArticle => "CREATE_KB_ARTICLE",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownActionError> {
        match value {
            "AUTO_RESOLVE" => Ok(Self::AutoResolve),
            "ESCALATE" => Ok(Self::Escalate),
            "REQUEST_CLARIFICATION" => Ok(Self::RequestClarification),
            "ASSIGN_TO_TEAM" => Ok(Self::AssignToTeam),
            "SCHEDULE_FOLLOWUP" => Ok(Self::ScheduleFollowup),
            "CREATE_KB_ARTICLE" => Ok(Self::CreateKbArticle),
            other => Err(UnknownActionError(other.to_string())),
        }
    }

    /// Only actions whose effect can be reversed from a recorded snapshot
    /// support rollback. Clarification requests and knowledge-base articles
    /// never do.
    pub fn rollback_supported(&self) -> bool {
        matches!(
            self,
            Self::AutoResolve | Self::AssignToTeam | Self::Escalate | Self::ScheduleFollowup
        )
    }

    /// Ticket fields an action writes. Drives supersession detection at
    /// rollback time.
    pub fn touched_fields(&self) -> &'static [SnapshotField] {
        match self {
            Self::AutoResolve | Self::Escalate | Self::RequestClarification => {
                &[SnapshotField::Status]
            }
            Self::AssignToTeam => &[SnapshotField::Status, SnapshotField::AssignedTo],
            Self::ScheduleFollowup | Self::CreateKbArticle => &[],
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown action type '{0}'")]
pub struct UnknownActionError(pub String);

/// Ticket fields captured in before/after snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotField {
    Status,
    AssignedTo,
}

/// True when rolling back `earlier` would silently clobber a field that
/// `newer` (a later, still-active action) also wrote.
pub fn supersedes(earlier: ActionType, newer: ActionType) -> bool {
    let earlier_fields = earlier.touched_fields();
    newer
        .touched_fields()
        .iter()
        .any(|field| earlier_fields.contains(field))
}

/// Escalation urgency hint, passed through to notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPriority {
    #[default]
    Normal,
    High,
}

/// Action-specific parameters as a tagged union keyed by the action type.
/// Every variant carries its own strongly-typed record — no loosely-typed
/// maps at the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionParams {
    AutoResolve {
        resolution_steps: Vec<String>,
    },
    Escalate {
        escalation_reason: String,
        #[serde(default)]
        priority: EscalationPriority,
    },
    RequestClarification {
        missing_fields: Vec<String>,
        reason: String,
    },
    AssignToTeam {
        team: String,
    },
    ScheduleFollowup {
        followup_in_hours: u32,
        #[serde(default)]
        tentative_steps: Vec<String>,
    },
    CreateKbArticle {},
}

impl ActionParams {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::AutoResolve { .. } => ActionType::AutoResolve,
            Self::Escalate { .. } => ActionType::Escalate,
            Self::RequestClarification { .. } => ActionType::RequestClarification,
            Self::AssignToTeam { .. } => ActionType::AssignToTeam,
            Self::ScheduleFollowup { .. } => ActionType::ScheduleFollowup,
            Self::CreateKbArticle {} => ActionType::CreateKbArticle,
        }
    }
}

/// Snapshot of the ticket fields an action may mutate. Captured immediately
/// before and after execution; rollback restores these values verbatim and
/// never re-derives them from business logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TicketSnapshot {
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

/// Immutable audit record of one executed autonomous action, with enough
/// state to reverse it. `rolled_back` transitions false→true at most once.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionHistoryEntry {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub action_type: ActionType,
    pub action_params: ActionParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    pub agent_reasoning: String,
    pub executed_at: DateTime<Utc>,
    pub executed_by: String,
    pub rollback_possible: bool,
    pub rolled_back: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_state: Option<TicketSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_state: Option<TicketSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_eligibility_matrix() {
        assert!(ActionType::AutoResolve.rollback_supported());
        assert!(ActionType::AssignToTeam.rollback_supported());
        assert!(ActionType::Escalate.rollback_supported());
        assert!(ActionType::ScheduleFollowup.rollback_supported());
        assert!(!ActionType::RequestClarification.rollback_supported());
        assert!(!ActionType::CreateKbArticle.rollback_supported());
    }

    #[test]
    fn action_type_round_trips_through_text() {
        for action in [
            ActionType::AutoResolve,
            ActionType::Escalate,
            ActionType::RequestClarification,
            ActionType::AssignToTeam,
            ActionType::ScheduleFollowup,
            ActionType::CreateKbArticle,
        ] {
            assert_eq!(ActionType::parse(action.as_str()).unwrap(), action);
        }
        assert!(ActionType::parse("DO_NOTHING").is_err());
    }

    #[test]
    fn params_carry_the_action_tag_on_the_wire() {
        let params = ActionParams::AutoResolve {
            resolution_steps: vec!["restart client".to_string()],
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["action"], "AUTO_RESOLVE");
        assert_eq!(value["resolution_steps"][0], "restart client");

        let back: ActionParams = serde_json::from_value(value).unwrap();
        assert_eq!(back.action_type(), ActionType::AutoResolve);
    }

    #[test]
    fn status_writers_supersede_each_other() {
        assert!(supersedes(ActionType::AutoResolve, ActionType::Escalate));
        assert!(supersedes(ActionType::Escalate, ActionType::AssignToTeam));
        assert!(supersedes(ActionType::AssignToTeam, ActionType::AutoResolve));
    }

    #[test]
    fn non_mutating_actions_never_conflict() {
        assert!(!supersedes(ActionType::ScheduleFollowup, ActionType::AutoResolve));
        assert!(!supersedes(ActionType::AutoResolve, ActionType::CreateKbArticle));
        assert!(!supersedes(ActionType::AutoResolve, ActionType::ScheduleFollowup));
    }

    #[test]
    fn snapshot_omits_absent_assignee_on_the_wire() {
        let snap = TicketSnapshot {
            status: TicketStatus::InProgress,
            assigned_to: None,
        };
        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(value, serde_json::json!({"status": "in_progress"}));

        let back: TicketSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snap);
    }
}
