// company_lookup.rs — Resolve the company to its knowledge-base id.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use em_model::CompanyId;
use em_queue::{JobContext, StageError, StageHandler, StageOutcome};
use em_review::CompletionBackend;

use crate::completion::ask_json;
use crate::payload::LookupPayload;

const LOOKUP_INSTRUCTION: &str = "Identify the company's knowledge-base entry. Reply with \
JSON in a ```json code block: {\"node\": \"Q…\", \"label\": \"…\"} where node is the \
entity id (a Q followed by digits) and label is the canonical name. Pick the entity for \
the company itself, not a parent group or a brand.";

#[derive(Deserialize)]
struct LookupReply {
    node: String,
    #[serde(default)]
    label: Option<String>,
}

/// Flow child: turns the company name into a validated external id. The
/// result lands in the extraction parent's payload under this stage's
/// name.
pub struct CompanyLookupStage {
    backend: Arc<dyn CompletionBackend>,
}

impl CompanyLookupStage {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl StageHandler for CompanyLookupStage {
    async fn run(&self, ctx: JobContext) -> Result<StageOutcome, StageError> {
        let input: LookupPayload = ctx.parse()?;

        let ask = match &input.description {
            Some(description) => format!("{}\n{}", input.company_name, description),
            None => input.company_name.clone(),
        };
        let reply: LookupReply =
            ask_json(self.backend.as_ref(), LOOKUP_INSTRUCTION, &ask, &input.shape).await?;

        // A malformed id is the backend's mistake, not the payload's;
        // retry with the validation error in view.
        let company_id = CompanyId::new(reply.node.as_str()).map_err(|e| {
            StageError::OutputShape {
                output: reply.node.clone(),
                message: e.to_string(),
            }
        })?;

        tracing::info!(company = %input.company_name, id = %company_id, "company resolved");
        Ok(StageOutcome::Complete(json!({
            "company_id": company_id,
            "label": reply.label,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use em_review::CompletionError;
    use uuid::Uuid;

    struct Fixed(&'static str);

    #[async_trait]
    impl CompletionBackend for Fixed {
        async fn complete(
            &self,
            _instruction: &str,
            _input: &str,
        ) -> Result<String, CompletionError> {
            Ok(self.0.to_string())
        }
    }

    fn context() -> JobContext {
        JobContext {
            job_id: Uuid::new_v4(),
            stage: super::super::COMPANY_LOOKUP.to_string(),
            payload: json!({
                "url": "https://example.com/report.pdf",
                "paragraphs": [],
                "company_name": "Acme AB",
                "description": "Makes widgets.",
            }),
            attempt: 1,
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn resolves_a_valid_node_id() {
        let stage = CompanyLookupStage::new(Arc::new(Fixed(
            "```json\n{\"node\": \"Q52825\", \"label\": \"Acme\"}\n```",
        )));
        let outcome = stage.run(context()).await.unwrap();
        let StageOutcome::Complete(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["company_id"], "Q52825");
        assert_eq!(result["label"], "Acme");
    }

    #[tokio::test]
    async fn malformed_node_id_is_an_output_shape_failure() {
        let stage = CompanyLookupStage::new(Arc::new(Fixed(
            "```json\n{\"node\": \"acme-ab\"}\n```",
        )));
        let err = stage.run(context()).await.unwrap_err();
        let StageError::OutputShape { output, .. } = err else {
            panic!("expected output shape failure, got {err:?}");
        };
        assert_eq!(output, "acme-ab");
    }
}
