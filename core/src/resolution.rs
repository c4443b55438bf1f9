use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Satisfaction scores at or above this count as a successful resolution.
pub const SATISFACTION_SUCCESS_THRESHOLD: i32 = 4;

/// Outcome tracking for a ticket that went through an autonomous resolution.
/// One row per ticket, created lazily; repeated feedback overwrites the
/// latest snapshot rather than keeping an edit history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResolutionTracking {
    pub ticket_id: Uuid,
    /// Action type that produced this resolution ("MANUAL" when feedback
    /// arrived before any autonomous action)
    pub autonomous_action: String,
    /// User confirmed the resolution worked (true) or failed (false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_confirmed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_text: Option<String>,
    /// User satisfaction rating, 1-5
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satisfaction_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followup_sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_received_at: Option<DateTime<Utc>>,
    pub reopened: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reopened_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reopened_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResolutionTracking {
    /// Did the resolution actually work? `None` means unknown — an absent
    /// signal is never coerced to failure.
    pub fn was_successful(&self) -> Option<bool> {
        if self.reopened {
            return Some(false);
        }
        if self.resolution_confirmed == Some(true) {
            return Some(true);
        }
        if self
            .satisfaction_score
            .is_some_and(|score| score >= SATISFACTION_SUCCESS_THRESHOLD)
        {
            return Some(true);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracking() -> ResolutionTracking {
        let now = Utc::now();
        ResolutionTracking {
            ticket_id: Uuid::now_v7(),
            autonomous_action: "AUTO_RESOLVE".to_string(),
            resolution_confirmed: None,
            feedback_text: None,
            satisfaction_score: None,
            followup_sent_at: None,
            response_received_at: None,
            reopened: false,
            reopened_at: None,
            reopened_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn no_signal_is_unknown_not_failure() {
        assert_eq!(tracking().was_successful(), None);
    }

    #[test]
    fn reopening_dominates_every_other_signal() {
        let mut t = tracking();
        t.reopened = true;
        t.resolution_confirmed = Some(true);
        t.satisfaction_score = Some(5);
        assert_eq!(t.was_successful(), Some(false));
    }

    #[test]
    fn confirmation_marks_success() {
        let mut t = tracking();
        t.resolution_confirmed = Some(true);
        assert_eq!(t.was_successful(), Some(true));
    }

    #[test]
    fn high_satisfaction_marks_success() {
        let mut t = tracking();
        t.satisfaction_score = Some(SATISFACTION_SUCCESS_THRESHOLD);
        assert_eq!(t.was_successful(), Some(true));

        t.satisfaction_score = Some(SATISFACTION_SUCCESS_THRESHOLD - 1);
        assert_eq!(t.was_successful(), None);
    }
}
