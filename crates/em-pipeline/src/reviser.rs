// reviser.rs — Applies reviewer comments to a proposed record.
//
// When a reviewer answers a prompt with free-text feedback instead of an
// approve or reject, the proposal is not discarded; the comment is folded
// into the record and the result goes back through the gate as a fresh
// save. The revision itself is a completion ask with the same shape
// discipline as extraction: invalid JSON is an output-shape failure and
// the next attempt sees what went wrong.

use std::sync::Arc;

use serde_json::{json, Value};

use em_queue::StageError;
use em_review::CompletionBackend;

use crate::completion::ask_json;
use crate::payload::ShapeFeedback;

const REVISE_INSTRUCTION: &str = "A reviewer commented on a proposed disclosure record. \
Apply the comment to the record and reply with the corrected record as JSON in a \
```json code block. Keep exactly the structure of the proposed record; change only \
what the comment asks for. Do not add fields and do not invent figures.";

/// Rewrites one category's proposed value according to a reviewer comment.
#[derive(Clone)]
pub struct ProposalReviser {
    backend: Arc<dyn CompletionBackend>,
}

impl ProposalReviser {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Returns the revised record. The reply must parse as JSON; anything
    /// else surfaces as an output-shape failure so the retry carries the
    /// previous reply and the parse error.
    pub async fn revise(
        &self,
        proposal: &Value,
        comment: &str,
        feedback: &ShapeFeedback,
    ) -> Result<Value, StageError> {
        let input = json!({
            "proposal": proposal,
            "comment": comment,
        })
        .to_string();
        ask_json(self.backend.as_ref(), REVISE_INSTRUCTION, &input, feedback).await
    }
}
