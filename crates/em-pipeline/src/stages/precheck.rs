// precheck.rs — Establish base facts and fan out the lookup children.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use em_queue::{JobContext, JobOptions, JobTable, StageError, StageHandler, StageOutcome};
use em_review::{CompletionBackend, ReviewChannel};

use crate::completion::{ask_text, truncated, ASK_EXTRACT_LIMIT};
use crate::payload::PrecheckPayload;
use crate::stages::{channel_error, queue_error, COMPANY_LOOKUP, EXTRACT_EMISSIONS, FISCAL_YEAR};

const NAME_INSTRUCTION: &str = "What is the name of the company? Respond only with the \
company name. The name is used to find the company's knowledge-base entry. The following \
is an extract from a sustainability report:";

const DESCRIPTION_INSTRUCTION: &str = "Give a short description of the company. Respond \
only with the description text. Be factual and informative; the text appears on a public \
disclosure page, so leave out anything that reads as marketing. The following is an \
extract from a sustainability report:";

/// Names the company, drafts its description and submits the extraction
/// flow: two children (knowledge-base lookup, fiscal year) feeding one
/// extraction parent.
pub struct PrecheckStage {
    table: Arc<JobTable>,
    backend: Arc<dyn CompletionBackend>,
    channel: Arc<dyn ReviewChannel>,
}

impl PrecheckStage {
    pub fn new(
        table: Arc<JobTable>,
        backend: Arc<dyn CompletionBackend>,
        channel: Arc<dyn ReviewChannel>,
    ) -> Self {
        Self {
            table,
            backend,
            channel,
        }
    }
}

#[async_trait]
impl StageHandler for PrecheckStage {
    async fn run(&self, ctx: JobContext) -> Result<StageOutcome, StageError> {
        let input: PrecheckPayload = ctx.parse()?;
        let extract = truncated(&input.paragraphs.join("\n\n"), ASK_EXTRACT_LIMIT);

        let company_name = ask_text(self.backend.as_ref(), NAME_INSTRUCTION, &extract).await?;
        tracing::info!(url = %input.url, company = %company_name, "company identified");

        self.channel
            .notify(ctx.job_id, &format!("Working on {company_name}."))
            .await
            .map_err(channel_error)?;

        let description =
            ask_text(self.backend.as_ref(), DESCRIPTION_INSTRUCTION, &extract).await?;

        let base = json!({
            "url": input.url,
            "paragraphs": input.paragraphs,
            "company_name": company_name,
            "description": description,
        });
        let flow = self
            .table
            .submit_flow(
                EXTRACT_EMISSIONS,
                base.clone(),
                vec![
                    (COMPANY_LOOKUP.to_string(), base.clone()),
                    (FISCAL_YEAR.to_string(), base),
                ],
                JobOptions::default(),
            )
            .map_err(queue_error)?;

        Ok(StageOutcome::Complete(json!({
            "company_name": company_name,
            "description": description,
            "flow_parent": flow.parent_id,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use em_queue::{EventDispatcher, JobState};
    use em_review::{CompletionError, RecordingChannel};
    use uuid::Uuid;

    struct BaseFacts;

    #[async_trait]
    impl CompletionBackend for BaseFacts {
        async fn complete(
            &self,
            instruction: &str,
            _input: &str,
        ) -> Result<String, CompletionError> {
            if instruction.contains("name of the company") {
                Ok("Acme AB".to_string())
            } else {
                Ok("Acme AB makes widgets.".to_string())
            }
        }
    }

    fn context() -> JobContext {
        JobContext {
            job_id: Uuid::new_v4(),
            stage: super::super::PRECHECK.to_string(),
            payload: json!({
                "url": "https://example.com/report.pdf",
                "paragraphs": ["Acme AB annual report 2022."],
            }),
            attempt: 1,
            max_attempts: 2,
        }
    }

    #[tokio::test]
    async fn submits_the_extraction_flow() {
        let table = Arc::new(JobTable::new(Arc::new(EventDispatcher::new())));
        let channel = Arc::new(RecordingChannel::new());
        let stage = PrecheckStage::new(table.clone(), Arc::new(BaseFacts), channel.clone());

        let outcome = stage.run(context()).await.unwrap();
        let StageOutcome::Complete(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["company_name"], "Acme AB");

        // Two children queued; the parent waits for both.
        let lookups = table.jobs_for_stage(COMPANY_LOOKUP).unwrap();
        let fiscals = table.jobs_for_stage(FISCAL_YEAR).unwrap();
        assert_eq!(lookups.len(), 1);
        assert_eq!(fiscals.len(), 1);
        assert_eq!(lookups[0].payload["company_name"], "Acme AB");

        let parents = table.jobs_for_stage(EXTRACT_EMISSIONS).unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].state, JobState::WaitingChildren);

        let notices = channel.notices();
        assert!(notices[0].text().contains("Acme AB"));
    }
}
