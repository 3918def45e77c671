// fiscal_year.rs — Determine the months bounding the reporting year.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use em_queue::{JobContext, StageError, StageHandler, StageOutcome};
use em_review::CompletionBackend;

use crate::completion::{ask_json, truncated, ASK_EXTRACT_LIMIT};
use crate::payload::FiscalPayload;

const FISCAL_INSTRUCTION: &str = "Which months bound the company's fiscal year? Reply \
with JSON in a ```json code block: {\"start_month\": M, \"end_month\": M} with months \
as numbers 1 through 12. A calendar-year report is {\"start_month\": 1, \
\"end_month\": 12}. If the report does not say, assume the calendar year.";

#[derive(Deserialize)]
struct FiscalReply {
    start_month: u32,
    end_month: u32,
}

/// Flow child: reads the fiscal year months out of the report. Reporting
/// years downstream become dated periods through these months, so a wrong
/// pair shifts every period of the company.
pub struct FiscalYearStage {
    backend: Arc<dyn CompletionBackend>,
}

impl FiscalYearStage {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl StageHandler for FiscalYearStage {
    async fn run(&self, ctx: JobContext) -> Result<StageOutcome, StageError> {
        let input: FiscalPayload = ctx.parse()?;
        let extract = truncated(&input.paragraphs.join("\n\n"), ASK_EXTRACT_LIMIT);

        let reply: FiscalReply =
            ask_json(self.backend.as_ref(), FISCAL_INSTRUCTION, &extract, &input.shape).await?;

        for month in [reply.start_month, reply.end_month] {
            if !(1..=12).contains(&month) {
                return Err(StageError::OutputShape {
                    output: format!(
                        "{{\"start_month\": {}, \"end_month\": {}}}",
                        reply.start_month, reply.end_month
                    ),
                    message: format!("month {month} is not in 1..=12"),
                });
            }
        }

        Ok(StageOutcome::Complete(json!({
            "start_month": reply.start_month,
            "end_month": reply.end_month,
        })))
    }
}
