// extract_emissions.rs — Flow parent: extract the facts, fan out saves.
//
// Runs after both children complete, with their results merged into the
// payload under the child stage names. The extraction itself is one ask
// over the full passage set; the result is split per category so each
// save carries exactly one reviewable slice.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use em_queue::{
    deep_merge, JobContext, JobOptions, JobTable, StageError, StageHandler, StageOutcome,
};
use em_review::CompletionBackend;

use crate::completion::ask_json;
use crate::payload::{to_json, ExtractPayload, ExtractedFacts};
use crate::stages::{queue_error, SAVE_TO_API};

const EXTRACT_INSTRUCTION: &str = r#"Extract the company's disclosure data from the report extract below. Reply with JSON in a ```json code block, following exactly this structure and leaving out anything the report does not state:

{
  "scope12": [{"year": 2023, "scope1": {"total": 0}, "scope2": {"mb": 0, "lb": 0, "unknown": 0}}],
  "scope3": [{"year": 2023, "scope3": {"categories": [{"category": 1, "total": 0}], "stated_total_emissions": {"total": 0}}}],
  "biogenic": [{"year": 2023, "biogenic": {"total": 0}}],
  "economy": [{"year": 2023, "economy": {"turnover": {"value": 0, "currency": ""}, "employees": {"value": 0, "unit": ""}}}],
  "goals": [{"description": "", "year": "", "target": 0, "base_year": ""}],
  "initiatives": [{"title": "", "description": "", "year": "", "scope": ""}],
  "industry": {"sub_industry_code": ""}
}

All emission figures are tonnes of CO2 equivalent. Scope 2 has three methods: market-based (mb), location-based (lb) and unknown when the report does not say which. Scope 3 categories follow the GHG Protocol, 1 through 15, with 16 for figures reported outside the standard categories. The industry code is the eight-digit GICS sub-industry. Report against the years the report itself uses and include every year it states. Never invent figures; leave out any field, year or category the report does not state."#;

/// One ask, then one `save_to_api` job per disclosed category.
pub struct ExtractEmissionsStage {
    table: Arc<JobTable>,
    backend: Arc<dyn CompletionBackend>,
}

impl ExtractEmissionsStage {
    pub fn new(table: Arc<JobTable>, backend: Arc<dyn CompletionBackend>) -> Self {
        Self { table, backend }
    }
}

#[async_trait]
impl StageHandler for ExtractEmissionsStage {
    async fn run(&self, ctx: JobContext) -> Result<StageOutcome, StageError> {
        let input: ExtractPayload = ctx.parse()?;

        let facts: ExtractedFacts = ask_json(
            self.backend.as_ref(),
            EXTRACT_INSTRUCTION,
            &input.paragraphs.join("\n\n"),
            &input.shape,
        )
        .await?;
        let facts = normalized(facts)?;

        if facts.is_empty() {
            tracing::warn!(company = %input.company_name, "report yielded no disclosure data");
            return Ok(StageOutcome::Complete(json!({ "saves": 0 })));
        }

        let base = json!({
            "url": input.url,
            "company_id": input.company_lookup.company_id,
            "company_name": input.company_name,
            "description": input.description,
            "fiscal_year": input.fiscal_year,
        });

        let mut categories = Vec::new();
        for (key, value) in category_values(&facts) {
            let mut payload = base.clone();
            deep_merge(&mut payload, &json!({ key: value }));
            self.table
                .submit(SAVE_TO_API, payload, JobOptions::default())
                .map_err(queue_error)?;
            categories.push(key);
        }

        tracing::info!(
            company = %input.company_name,
            saves = categories.len(),
            "extraction fanned out"
        );
        Ok(StageOutcome::Complete(json!({
            "saves": categories.len(),
            "categories": categories,
        })))
    }
}

/// Checks serde cannot express, plus cleanup of degenerate entries the
/// backend tends to produce: scope 2 with no figure at all, years with
/// neither scope.
fn normalized(mut facts: ExtractedFacts) -> Result<ExtractedFacts, StageError> {
    for year in &facts.scope3 {
        for category in &year.scope3.categories {
            if !(1..=16).contains(&category.category) {
                return Err(StageError::OutputShape {
                    output: to_json(&facts).to_string(),
                    message: format!(
                        "scope 3 category {} is not in 1..=16",
                        category.category
                    ),
                });
            }
        }
    }
    for year in &mut facts.scope12 {
        let empty_scope2 = year
            .scope2
            .as_ref()
            .is_some_and(|s| s.mb.is_none() && s.lb.is_none() && s.unknown.is_none());
        if empty_scope2 {
            year.scope2 = None;
        }
    }
    facts
        .scope12
        .retain(|year| year.scope1.is_some() || year.scope2.is_some());
    Ok(facts)
}

/// The non-empty categories as `(payload key, value)` pairs, in save
/// order.
fn category_values(facts: &ExtractedFacts) -> Vec<(&'static str, Value)> {
    let mut out = Vec::new();
    if !facts.scope12.is_empty() {
        out.push(("scope12", to_json(&facts.scope12)));
    }
    if !facts.scope3.is_empty() {
        out.push(("scope3", to_json(&facts.scope3)));
    }
    if !facts.biogenic.is_empty() {
        out.push(("biogenic", to_json(&facts.biogenic)));
    }
    if !facts.economy.is_empty() {
        out.push(("economy", to_json(&facts.economy)));
    }
    if !facts.goals.is_empty() {
        out.push(("goals", to_json(&facts.goals)));
    }
    if !facts.initiatives.is_empty() {
        out.push(("initiatives", to_json(&facts.initiatives)));
    }
    if let Some(industry) = &facts.industry {
        out.push(("industry", to_json(industry)));
    }
    out
}
