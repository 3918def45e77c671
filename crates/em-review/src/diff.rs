// diff.rs — Change summaries synthesized from before/after slices.
//
// The gate never shows reviewers raw JSON. A completion backend turns the
// before/after pair into a short prose summary of what actually changed,
// or the NO_CHANGES sentinel when the difference is immaterial (same
// values reworded, reordered, or re-derived). Any text-generation service
// satisfies the backend contract; tests script it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Sentinel the backend returns when nothing material changed.
pub const NO_CHANGES: &str = "NO_CHANGES";

/// Instruction sent with every summarize call. The contract the backend
/// must honor: value changes only, reviewer-readable, periods named by
/// their end year, and the sentinel when nothing material changed.
const DIFF_INSTRUCTION: &str = "Compare the before and after JSON values and describe \
what changed, in brief markdown a reviewer can approve from. Mention only values that \
differ, never structure or field names. Refer to a reporting period by the final year \
of its date range. Do not repeat unchanged values. If nothing material changed, reply \
with exactly NO_CHANGES.";

/// Errors from the completion backend.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The service could not be reached or errored; retryable.
    #[error("completion backend unavailable: {0}")]
    Unavailable(String),

    /// The service answered with something the caller cannot use.
    #[error("completion backend returned unusable output: {0}")]
    Unusable(String),
}

/// A text-generation service.
///
/// `instruction` states the task; `input` carries the data it applies
/// to. The backend returns plain text; shape expectations (JSON, the
/// sentinel) are the caller's contract, validated by the caller.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, instruction: &str, input: &str) -> Result<String, CompletionError>;
}

/// What the synthesizer concluded about a before/after pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSummary {
    /// Nothing material changed; the gate commits without a prompt.
    NoChanges,

    /// A reviewer-readable description of the change.
    Changed(String),
}

/// Turns a before/after pair into a [`DiffSummary`].
pub struct DiffSynthesizer {
    backend: Arc<dyn CompletionBackend>,
}

impl DiffSynthesizer {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Summarize the change from `before` to `after`.
    ///
    /// A response containing the sentinel anywhere counts as no change;
    /// backends sometimes wrap it in pleasantries.
    pub async fn summarize(
        &self,
        before: &Value,
        after: &Value,
    ) -> Result<DiffSummary, CompletionError> {
        let input = serde_json::json!({ "before": before, "after": after }).to_string();
        let text = self.backend.complete(DIFF_INSTRUCTION, &input).await?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CompletionError::Unusable(
                "empty diff summary".to_string(),
            ));
        }
        if trimmed.contains(NO_CHANGES) {
            Ok(DiffSummary::NoChanges)
        } else {
            Ok(DiffSummary::Changed(trimmed.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Backend scripted with a fixed reply.
    struct Scripted(&'static str);

    #[async_trait]
    impl CompletionBackend for Scripted {
        async fn complete(
            &self,
            _instruction: &str,
            _input: &str,
        ) -> Result<String, CompletionError> {
            Ok(self.0.to_string())
        }
    }

    /// Backend that captures the input it was given.
    struct Capture(std::sync::Mutex<String>);

    #[async_trait]
    impl CompletionBackend for Capture {
        async fn complete(
            &self,
            _instruction: &str,
            input: &str,
        ) -> Result<String, CompletionError> {
            *self.0.lock().unwrap() = input.to_string();
            Ok("scope 1 rose from 100 to 150".to_string())
        }
    }

    #[tokio::test]
    async fn sentinel_reply_means_no_changes() {
        let synthesizer = DiffSynthesizer::new(Arc::new(Scripted("NO_CHANGES")));
        let summary = synthesizer
            .summarize(&json!({"scope1": 100}), &json!({"scope1": 100}))
            .await
            .unwrap();
        assert_eq!(summary, DiffSummary::NoChanges);
    }

    #[tokio::test]
    async fn wrapped_sentinel_still_counts() {
        let synthesizer =
            DiffSynthesizer::new(Arc::new(Scripted("Looking at both values: NO_CHANGES.")));
        let summary = synthesizer
            .summarize(&json!({}), &json!({}))
            .await
            .unwrap();
        assert_eq!(summary, DiffSummary::NoChanges);
    }

    #[tokio::test]
    async fn prose_reply_is_a_change() {
        let synthesizer =
            DiffSynthesizer::new(Arc::new(Scripted("Scope 1 for 2022 rose from 100 to 150.")));
        let summary = synthesizer
            .summarize(&json!({"scope1": 100}), &json!({"scope1": 150}))
            .await
            .unwrap();
        match summary {
            DiffSummary::Changed(text) => assert!(text.contains("rose from 100 to 150")),
            DiffSummary::NoChanges => panic!("expected a change"),
        }
    }

    #[tokio::test]
    async fn empty_reply_is_unusable() {
        let synthesizer = DiffSynthesizer::new(Arc::new(Scripted("   ")));
        let err = synthesizer.summarize(&json!({}), &json!({})).await;
        assert!(matches!(err, Err(CompletionError::Unusable(_))));
    }

    #[tokio::test]
    async fn backend_sees_before_and_after_together() {
        let capture = Arc::new(Capture(std::sync::Mutex::new(String::new())));
        let synthesizer = DiffSynthesizer::new(Arc::clone(&capture) as Arc<dyn CompletionBackend>);
        synthesizer
            .summarize(&json!({"scope1": 100}), &json!({"scope1": 150}))
            .await
            .unwrap();

        let input = capture.0.lock().unwrap().clone();
        let parsed: Value = serde_json::from_str(&input).unwrap();
        assert_eq!(parsed["before"]["scope1"], 100);
        assert_eq!(parsed["after"]["scope1"], 150);
    }
}
