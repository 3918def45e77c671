// ingest.rs — Entry stage: retrieve report passages and queue precheck.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use em_queue::{JobContext, JobOptions, JobTable, StageError, StageHandler, StageOutcome};
use em_review::ReviewChannel;

use crate::payload::IngestPayload;
use crate::search::DocumentSearch;
use crate::stages::{channel_error, queue_error, PRECHECK};

/// Indexed report chunks live in one collection keyed by source url.
const COLLECTION: &str = "emission_reports";

/// How many passages to pull per report. The asks downstream are bounded,
/// so more passages buys recall, not cost.
const PASSAGE_LIMIT: usize = 5;

/// Two probes into the index: a question in the register reports answer
/// in, and a keyword string for tables that embed poorly as prose.
const RETRIEVAL_QUERIES: [&str; 2] = [
    "What are the company's greenhouse gas emissions for scope 1, scope 2 \
     and scope 3, its climate goals and its reduction initiatives?",
    "GHG accounting, tCO2e, location-based, market-based, scope 1, scope 2, \
     scope 3, CO2, emissions, greenhouse gas, base year, climate target, \
     carbon, biogenic",
];

/// Looks up the indexed passages for a report url and hands them to
/// precheck. A report with no relevant passages ends the pipeline here.
pub struct IngestStage {
    table: Arc<JobTable>,
    search: Arc<dyn DocumentSearch>,
    channel: Arc<dyn ReviewChannel>,
}

impl IngestStage {
    pub fn new(
        table: Arc<JobTable>,
        search: Arc<dyn DocumentSearch>,
        channel: Arc<dyn ReviewChannel>,
    ) -> Self {
        Self {
            table,
            search,
            channel,
        }
    }
}

#[async_trait]
impl StageHandler for IngestStage {
    async fn run(&self, ctx: JobContext) -> Result<StageOutcome, StageError> {
        let input: IngestPayload = ctx.parse()?;

        let paragraphs = self
            .search
            .query(COLLECTION, &input.url, &RETRIEVAL_QUERIES, PASSAGE_LIMIT)
            .await
            .map_err(|e| StageError::transient(e.to_string()))?;

        if paragraphs.is_empty() {
            tracing::warn!(url = %input.url, "no passages found for report");
            self.channel
                .notify(
                    ctx.job_id,
                    &format!("No relevant passages found in {}.", input.url),
                )
                .await
                .map_err(channel_error)?;
            return Ok(StageOutcome::Complete(json!({
                "url": input.url,
                "passages": 0,
            })));
        }

        let passages = paragraphs.len();
        let precheck = self
            .table
            .submit(
                PRECHECK,
                json!({ "url": input.url, "paragraphs": paragraphs }),
                JobOptions::new(2).map_err(queue_error)?,
            )
            .map_err(queue_error)?;

        tracing::info!(url = %input.url, passages, %precheck, "report ingested");
        Ok(StageOutcome::Complete(json!({
            "url": input.url,
            "passages": passages,
            "precheck": precheck,
        })))
    }
}
