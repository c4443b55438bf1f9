//! The decision policy: a pure, total function from a ticket's latest AI
//! signal to exactly one of the six autonomous actions. No side effects, no
//! clock, no database — safe to re-run on the same input.

use crate::actions::{ActionParams, EscalationPriority};
use crate::tickets::TicketStatus;

/// At or above this confidence, a proposed fix with concrete steps is applied
/// directly.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Below this confidence the signal is not actionable and the requester is
/// asked for more detail.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Delay before a scheduled re-check of a tentative or autonomous fix.
pub const DEFAULT_FOLLOWUP_HOURS: u32 = 24;

/// Categories that always require a human, regardless of confidence.
pub const SENSITIVE_CATEGORIES: &[&str] = &["security"];

/// Everything the decision policy is allowed to look at.
#[derive(Debug, Clone)]
pub struct PolicyInput<'a> {
    pub confidence: f64,
    pub recommended_action: Option<&'a str>,
    pub resolution_steps: Vec<String>,
    pub explanation: Option<&'a str>,
    pub category: &'a str,
    pub description: Option<&'a str>,
    pub status: TicketStatus,
}

/// The chosen action's parameters plus the reasoning recorded in the action
/// history.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub params: ActionParams,
    pub reasoning: String,
}

/// Map a ticket's AI signal to an action. Total: every input produces exactly
/// one action; there is no "no action" outcome.
pub fn decide(input: &PolicyInput<'_>) -> Decision {
    let category = input.category.trim();

    // Sensitive categories override confidence-based routing entirely.
    if SENSITIVE_CATEGORIES
        .iter()
        .any(|c| category.eq_ignore_ascii_case(c))
    {
        return Decision {
            params: ActionParams::Escalate {
                escalation_reason: format!("Category '{category}' requires human review"),
                priority: EscalationPriority::High,
            },
            reasoning: format!("Sensitive category '{category}' overrides confidence-based routing"),
        };
    }

    // An already-resolved ticket with a publishable resolution can be turned
    // into a knowledge-base article when the scoring service asks for it.
    if input.status == TicketStatus::Resolved
        && input
            .recommended_action
            .is_some_and(|a| a.eq_ignore_ascii_case("create_kb_article"))
    {
        return Decision {
            params: ActionParams::CreateKbArticle {},
            reasoning: "Scoring service recommended publishing the resolution to the knowledge base"
                .to_string(),
        };
    }

    let missing = missing_fields(input);
    if !missing.is_empty() {
        let reason = format!("Required fields are missing or ambiguous: {}", missing.join(", "));
        return Decision {
            reasoning: reason.clone(),
            params: ActionParams::RequestClarification {
                missing_fields: missing,
                reason,
            },
        };
    }

    let confidence = input.confidence;

    if confidence < LOW_CONFIDENCE_THRESHOLD {
        let reason = format!(
            "Confidence {confidence:.2} is below the actionable threshold {LOW_CONFIDENCE_THRESHOLD:.2}"
        );
        return Decision {
            reasoning: reason.clone(),
            params: ActionParams::RequestClarification {
                missing_fields: Vec::new(),
                reason,
            },
        };
    }

    if confidence >= HIGH_CONFIDENCE_THRESHOLD && !input.resolution_steps.is_empty() {
        return Decision {
            params: ActionParams::AutoResolve {
                resolution_steps: input.resolution_steps.clone(),
            },
            reasoning: input
                .explanation
                .unwrap_or("High-confidence resolution proposed by the scoring service")
                .to_string(),
        };
    }

    if confidence >= LOW_CONFIDENCE_THRESHOLD {
        if !input.resolution_steps.is_empty() {
            return Decision {
                params: ActionParams::ScheduleFollowup {
                    followup_in_hours: DEFAULT_FOLLOWUP_HOURS,
                    tentative_steps: input.resolution_steps.clone(),
                },
                reasoning: format!(
                    "Confidence {confidence:.2} warrants trying the proposed fix with a scheduled re-check"
                ),
            };
        }
        let team = team_for_category(category);
        return Decision {
            params: ActionParams::AssignToTeam {
                team: team.to_string(),
            },
            reasoning: format!("Assigned to {team} based on category '{category}'"),
        };
    }

    // Nothing matched (e.g. NaN confidence). Fail safe: escalate, never no-op.
    Decision {
        params: ActionParams::Escalate {
            escalation_reason: "unhandled case".to_string(),
            priority: EscalationPriority::Normal,
        },
        reasoning: format!("No routing rule matched (confidence {confidence})"),
    }
}

fn missing_fields(input: &PolicyInput<'_>) -> Vec<String> {
    let mut missing = Vec::new();
    if input.description.is_none_or(|d| d.trim().is_empty()) {
        missing.push("description".to_string());
    }
    if input.category.trim().is_empty() {
        missing.push("category".to_string());
    }
    missing
}

/// Category → owning team routing table.
pub fn team_for_category(category: &str) -> &'static str {
    match category.to_ascii_lowercase().as_str() {
        "wifi" | "vpn" | "network" => "Network Operations",
        "laptop" | "printer" | "phone" | "hardware" => "Desktop Support",
        "software" | "email" | "cloud" | "storage" => "Application Support",
        "account" | "access" => "Identity & Access",
        "server" => "Infrastructure",
        _ => "IT Support",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionType;

    fn base_input(confidence: f64, steps: Vec<String>) -> PolicyInput<'static> {
        PolicyInput {
            confidence,
            recommended_action: None,
            resolution_steps: steps,
            explanation: None,
            category: "software",
            description: Some("Outlook crashes on startup"),
            status: TicketStatus::New,
        }
    }

    fn steps() -> Vec<String> {
        vec!["restart client".to_string(), "update driver".to_string()]
    }

    #[test]
    fn high_confidence_with_steps_auto_resolves() {
        let decision = decide(&base_input(0.92, steps()));
        assert_eq!(decision.params.action_type(), ActionType::AutoResolve);
        match decision.params {
            ActionParams::AutoResolve { resolution_steps } => {
                assert_eq!(resolution_steps, steps());
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[test]
    fn decision_is_deterministic() {
        let input = base_input(0.65, steps());
        assert_eq!(decide(&input), decide(&input));
    }

    #[test]
    fn every_confidence_edge_maps_to_a_defined_action() {
        for confidence in [0.0, 0.5, 0.8, 1.0] {
            for steps in [Vec::new(), steps()] {
                let decision = decide(&base_input(confidence, steps));
                // Totality: any input yields one of the six actions.
                let _ = decision.params.action_type();
            }
        }
    }

    #[test]
    fn confidence_edges_route_as_documented() {
        assert_eq!(
            decide(&base_input(0.0, steps())).params.action_type(),
            ActionType::RequestClarification
        );
        assert_eq!(
            decide(&base_input(0.5, steps())).params.action_type(),
            ActionType::ScheduleFollowup
        );
        assert_eq!(
            decide(&base_input(0.5, Vec::new())).params.action_type(),
            ActionType::AssignToTeam
        );
        assert_eq!(
            decide(&base_input(0.8, steps())).params.action_type(),
            ActionType::AutoResolve
        );
        assert_eq!(
            decide(&base_input(1.0, steps())).params.action_type(),
            ActionType::AutoResolve
        );
    }

    #[test]
    fn high_confidence_without_steps_falls_back_to_assignment() {
        let decision = decide(&base_input(0.95, Vec::new()));
        assert_eq!(decision.params.action_type(), ActionType::AssignToTeam);
    }

    #[test]
    fn security_category_escalates_regardless_of_confidence() {
        for confidence in [0.35, 0.99] {
            let mut input = base_input(confidence, steps());
            input.category = "security";
            let decision = decide(&input);
            assert_eq!(decision.params.action_type(), ActionType::Escalate);
            match decision.params {
                ActionParams::Escalate { priority, .. } => {
                    assert_eq!(priority, EscalationPriority::High);
                }
                other => panic!("unexpected params: {other:?}"),
            }
        }
    }

    #[test]
    fn missing_description_requests_clarification_with_field_list() {
        let mut input = base_input(0.92, steps());
        input.description = Some("   ");
        let decision = decide(&input);
        match decision.params {
            ActionParams::RequestClarification { missing_fields, .. } => {
                assert_eq!(missing_fields, vec!["description".to_string()]);
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[test]
    fn nan_confidence_escalates_as_unhandled() {
        let decision = decide(&base_input(f64::NAN, steps()));
        match decision.params {
            ActionParams::Escalate { escalation_reason, .. } => {
                assert_eq!(escalation_reason, "unhandled case");
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[test]
    fn kb_article_only_for_resolved_tickets_with_explicit_recommendation() {
        let mut input = base_input(0.9, steps());
        input.recommended_action = Some("create_kb_article");
        input.status = TicketStatus::Resolved;
        assert_eq!(
            decide(&input).params.action_type(),
            ActionType::CreateKbArticle
        );

        input.status = TicketStatus::New;
        assert_ne!(
            decide(&input).params.action_type(),
            ActionType::CreateKbArticle
        );
    }

    #[test]
    fn category_routing_table_covers_known_categories() {
        assert_eq!(team_for_category("vpn"), "Network Operations");
        assert_eq!(team_for_category("Laptop"), "Desktop Support");
        assert_eq!(team_for_category("email"), "Application Support");
        assert_eq!(team_for_category("access"), "Identity & Access");
        assert_eq!(team_for_category("server"), "Infrastructure");
        assert_eq!(team_for_category("other"), "IT Support");
    }
}
