use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle states a ticket moves through. Stored as text in the ticket
/// store and parsed back at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    InProgress,
    PendingClarification,
    Assigned,
    Escalated,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::PendingClarification => "pending_clarification",
            Self::Assigned => "assigned",
            Self::Escalated => "escalated",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownStatusError> {
        match value {
            "new" => Ok(Self::New),
            "in_progress" => Ok(Self::InProgress),
            "pending_clarification" => Ok(Self::PendingClarification),
            "assigned" => Ok(Self::Assigned),
            "escalated" => Ok(Self::Escalated),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            other => Err(UnknownStatusError(other.to_string())),
        }
    }

    /// Terminal states: follow-up checks treat these as "nothing left to do".
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown ticket status '{0}'")]
pub struct UnknownStatusError(pub String);

/// Kinds of entries in a ticket's interaction feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Clarification,
    Feedback,
    AgentResponse,
    UserMessage,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clarification => "clarification",
            Self::Feedback => "feedback",
            Self::AgentResponse => "agent_response",
            Self::UserMessage => "user_message",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownInteractionKindError> {
        match value {
            "clarification" => Ok(Self::Clarification),
            "feedback" => Ok(Self::Feedback),
            "agent_response" => Ok(Self::AgentResponse),
            "user_message" => Ok(Self::UserMessage),
            other => Err(UnknownInteractionKindError(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown interaction kind '{0}'")]
pub struct UnknownInteractionKindError(pub String);

/// Resolution steps from the scoring service arrive either as a list of
/// steps or as a single block of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ResolutionSteps {
    Many(Vec<String>),
    One(String),
}

impl ResolutionSteps {
    /// Normalized step lines: trimmed, empties dropped.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Many(steps) => steps
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Self::One(text) => text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

/// Payload returned by the AI scoring service for one ticket. Tolerant by
/// construction: every field is optional so an unexpected payload degrades to
/// a zero-confidence analysis instead of a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AgentAnalysis {
    /// Estimated correctness of the proposed resolution, in [0, 1]
    #[serde(default)]
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
    /// Free-form analysis payload, kept verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_steps: Option<ResolutionSteps>,
}

impl AgentAnalysis {
    /// Normalized resolution steps, empty when the service sent none.
    pub fn steps(&self) -> Vec<String> {
        self.resolution_steps
            .as_ref()
            .map(ResolutionSteps::lines)
            .unwrap_or_default()
    }

    /// Confidence clamped into [0, 1]; out-of-range values from the scoring
    /// service must not leak into history records or policy decisions.
    pub fn clamped_confidence(&self) -> f64 {
        self.confidence.clamp(0.0, 1.0)
    }
}

/// A support ticket as seen by the action engine.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Ticket {
    pub id: Uuid,
    pub requester_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_department: Option<String>,
    pub issue_type: String,
    pub status: TicketStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    /// Team or agent handle this ticket is assigned to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// Latest scoring-service payload for this ticket
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_response: Option<AgentAnalysis>,
    pub agent_processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry in a ticket's interaction feed. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TicketInteraction {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub actor: String,
    pub kind: InteractionKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Request to open a new ticket
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTicketRequest {
    pub requester_id: Uuid,
    #[serde(default)]
    pub requester_name: Option<String>,
    #[serde(default)]
    pub requester_department: Option<String>,
    pub issue_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_category() -> String {
    "other".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            TicketStatus::New,
            TicketStatus::InProgress,
            TicketStatus::PendingClarification,
            TicketStatus::Assigned,
            TicketStatus::Escalated,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ] {
            assert_eq!(TicketStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(TicketStatus::parse("reticulating").is_err());
    }

    #[test]
    fn terminal_statuses_are_resolved_and_closed_only() {
        assert!(TicketStatus::Resolved.is_terminal());
        assert!(TicketStatus::Closed.is_terminal());
        assert!(!TicketStatus::Escalated.is_terminal());
        assert!(!TicketStatus::New.is_terminal());
    }

    #[test]
    fn resolution_steps_accept_list_and_text() {
        let many: ResolutionSteps =
            serde_json::from_value(serde_json::json!(["restart client", " update driver "]))
                .unwrap();
        assert_eq!(many.lines(), vec!["restart client", "update driver"]);

        let one: ResolutionSteps =
            serde_json::from_value(serde_json::json!("restart client\n\nupdate driver")).unwrap();
        assert_eq!(one.lines(), vec!["restart client", "update driver"]);
    }

    #[test]
    fn agent_analysis_tolerates_sparse_payloads() {
        let analysis: AgentAnalysis = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(analysis.confidence, 0.0);
        assert!(analysis.steps().is_empty());
    }

    #[test]
    fn confidence_is_clamped_into_unit_interval() {
        let analysis = AgentAnalysis {
            confidence: 1.7,
            ..AgentAnalysis::default()
        };
        assert_eq!(analysis.clamped_confidence(), 1.0);

        let analysis = AgentAnalysis {
            confidence: -0.2,
            ..AgentAnalysis::default()
        };
        assert_eq!(analysis.clamped_confidence(), 0.0);
    }
}
