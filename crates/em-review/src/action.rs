// action.rs — Reviewer actions and the envelope they arrive in.
//
// A review prompt offers exactly four actions. The channel adapter turns
// whatever its medium produces (a button press, a slash command, a typed
// reply) into an ActionEnvelope and hands it to the dispatcher; nothing
// past the adapter knows which medium the reviewer used.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The decision a reviewer takes on a gated write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum ReviewAction {
    /// Commit the proposed slice and mark its metadata verified.
    Approve,

    /// Discard the proposed slice; nothing is written.
    Reject,

    /// The extraction itself looks wrong: re-run the originating stage
    /// with the same input and supersede the parked proposal.
    Retry,

    /// Re-run the stage with the reviewer's correction folded into its
    /// input, producing a new proposal.
    Feedback { text: String },
}

impl ReviewAction {
    /// Stable name used in callbacks and button ids.
    pub fn name(&self) -> &'static str {
        match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Reject => "reject",
            ReviewAction::Retry => "retry",
            ReviewAction::Feedback { .. } => "feedback",
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Action names rendered on every review prompt, in display order.
pub const PROMPT_ACTIONS: [&str; 4] = ["approve", "reject", "retry", "feedback"];

/// One reviewer action, correlated to the job it targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEnvelope {
    /// The gated job the prompt was posted for.
    pub job_id: Uuid,

    pub action: ReviewAction,

    /// Reviewer identity as the channel reports it (handle, user id).
    pub reviewer: String,

    pub received_at: DateTime<Utc>,
}

impl ActionEnvelope {
    pub fn new(job_id: Uuid, action: ReviewAction, reviewer: impl Into<String>) -> Self {
        Self {
            job_id,
            action,
            reviewer: reviewer.into(),
            received_at: Utc::now(),
        }
    }
}

impl fmt::Display for ActionEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} by {}", self.job_id, self.action, self.reviewer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_as_snake_case_tag() {
        let json = serde_json::to_string(&ReviewAction::Approve).unwrap();
        assert_eq!(json, r#"{"action":"approve"}"#);

        let json = serde_json::to_string(&ReviewAction::Feedback {
            text: "scope2 should be market-based".into(),
        })
        .unwrap();
        assert!(json.contains(r#""action":"feedback""#));
        assert!(json.contains("market-based"));
    }

    #[test]
    fn envelope_round_trip() {
        let envelope = ActionEnvelope::new(
            Uuid::new_v4(),
            ReviewAction::Feedback {
                text: "wrong unit".into(),
            },
            "alex",
        );
        let json = serde_json::to_string(&envelope).unwrap();
        let restored: ActionEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.job_id, envelope.job_id);
        assert_eq!(restored.action, envelope.action);
        assert_eq!(restored.reviewer, "alex");
    }

    #[test]
    fn action_names_match_prompt_actions() {
        let all = [
            ReviewAction::Approve,
            ReviewAction::Reject,
            ReviewAction::Retry,
            ReviewAction::Feedback { text: String::new() },
        ];
        for (action, expected) in all.iter().zip(PROMPT_ACTIONS) {
            assert_eq!(action.name(), expected);
        }
    }
}
