// gate.rs — Decides whether a proposed write needs a human.
//
// Decision ladder, in order:
//   1. Nothing stored yet          -> commit silently (FirstWrite)
//   2. Change judged immaterial    -> commit, notify reviewers (NoChanges)
//   3. Material change             -> post a prompt, park the job
//
// The gate only decides and talks to the channel. The calling stage owns
// the follow-through: committing on the first two outcomes, parking the
// job until `wake_at` on the third.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::action::PROMPT_ACTIONS;
use crate::channel::ReviewChannel;
use crate::diff::{DiffSummary, DiffSynthesizer};
use crate::error::ReviewError;
use crate::proposal::Proposal;

/// Upper bound on outgoing prompt length; channels cap message size.
const MAX_PROMPT_LEN: usize = 2000;

/// What the gate concluded about a proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Nothing stored yet for this slice; commit without review.
    FirstWrite,

    /// The change is immaterial; commit. Reviewers were sent a notice.
    NoChanges,

    /// The change is material; a prompt is posted. Park the job until
    /// `wake_at` so a missed callback still gets a second look.
    Suspended { wake_at: DateTime<Utc> },
}

pub struct ReviewGate {
    synthesizer: DiffSynthesizer,
    channel: Arc<dyn ReviewChannel>,
    review_window: Duration,
}

impl ReviewGate {
    /// Gate with the default one-day review window.
    pub fn new(synthesizer: DiffSynthesizer, channel: Arc<dyn ReviewChannel>) -> Self {
        Self {
            synthesizer,
            channel,
            review_window: Duration::hours(24),
        }
    }

    /// Override how long a parked job waits before re-surfacing.
    pub fn with_review_window(mut self, window: Duration) -> Self {
        self.review_window = window;
        self
    }

    /// Evaluate a proposal. `job_id` identifies the parked job so that
    /// reviewer callbacks can find their way back.
    pub async fn evaluate(
        &self,
        job_id: Uuid,
        proposal: &Proposal,
    ) -> Result<GateDecision, ReviewError> {
        if proposal.is_first_write() {
            info!(
                %job_id,
                company = %proposal.company,
                endpoint = %proposal.endpoint,
                "first write, review bypassed"
            );
            return Ok(GateDecision::FirstWrite);
        }

        let summary = self
            .synthesizer
            .summarize(&proposal.before, &proposal.after)
            .await?;

        match summary {
            DiffSummary::NoChanges => {
                let notice = format!(
                    "# {}: {}\n\nNo material changes, saved without review.",
                    proposal.company_name, proposal.endpoint
                );
                self.channel.notify(job_id, &notice).await?;
                info!(
                    %job_id,
                    company = %proposal.company,
                    endpoint = %proposal.endpoint,
                    "no material changes, committing without review"
                );
                Ok(GateDecision::NoChanges)
            }
            DiffSummary::Changed(text) => {
                let prompt = truncated(
                    &format!(
                        "# {}: {}\n\n{}",
                        proposal.company_name, proposal.endpoint, text
                    ),
                    MAX_PROMPT_LEN,
                );
                self.channel
                    .post_prompt(job_id, &prompt, &PROMPT_ACTIONS)
                    .await?;
                let wake_at = Utc::now() + self.review_window;
                info!(
                    %job_id,
                    company = %proposal.company,
                    endpoint = %proposal.endpoint,
                    %wake_at,
                    "material change, awaiting review"
                );
                Ok(GateDecision::Suspended { wake_at })
            }
        }
    }
}

/// Cut `s` to at most `max` bytes, backing off to a char boundary.
fn truncated(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
