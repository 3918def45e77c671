// save_to_api.rs — The gated persistence stage.
//
// One job per company and category. Unless the payload already carries
// an approval, the proposed slice goes through the review gate; a
// material change parks the job until a reviewer acts or the review
// window lapses. Callbacks never reach this code directly: the
// dispatcher patches the parked payload and re-queues it, so every
// decision is read from flags at the top of a fresh run.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use em_model::{period_dates, Company, Goal, Initiative, Metadata};
use em_queue::{JobContext, JobOptions, JobTable, StageError, StageHandler, StageOutcome};
use em_review::{
    GateDecision, PendingReviews, Proposal, ReviewChannel, ReviewGate, ReviewOrigin,
};
use em_store::{EntityStore, PeriodKey};

use crate::payload::{Category, SavePayload};
use crate::reviser::ProposalReviser;
use crate::slice::{after_slice, before_slice};
use crate::stages::{channel_error, queue_error, review_error, store_error, SAVE_TO_API};

/// `added_by` on every record the pipeline writes.
const EXTRACTOR: &str = "Emissary";
const EXTRACT_COMMENT: &str = "Parsed from the report by Emissary";

pub struct SaveToApiStage {
    table: Arc<JobTable>,
    store: Arc<dyn EntityStore>,
    gate: ReviewGate,
    reviser: ProposalReviser,
    pending: PendingReviews,
    channel: Arc<dyn ReviewChannel>,
}

impl SaveToApiStage {
    pub fn new(
        table: Arc<JobTable>,
        store: Arc<dyn EntityStore>,
        gate: ReviewGate,
        reviser: ProposalReviser,
        pending: PendingReviews,
        channel: Arc<dyn ReviewChannel>,
    ) -> Self {
        Self {
            table,
            store,
            gate,
            reviser,
            pending,
            channel,
        }
    }

    /// Fold the reviewer's comment into the category value and submit
    /// the result as a fresh save. The fresh job starts from a pristine
    /// payload, so the revision faces the gate like any other proposal.
    async fn revise_and_resubmit(
        &self,
        ctx: &JobContext,
        save: &SavePayload,
        category: Category,
        comment: &str,
    ) -> Result<StageOutcome, StageError> {
        let key = category.key();
        let current = ctx.payload.get(key).cloned().unwrap_or(Value::Null);
        let revised = self.reviser.revise(&current, comment, &save.shape).await?;

        let mut fresh = save.pristine();
        fresh[key] = revised;
        let parsed: SavePayload =
            serde_json::from_value(fresh.clone()).map_err(|e| StageError::OutputShape {
                output: fresh.to_string(),
                message: format!("revised record does not fit the save payload: {e}"),
            })?;
        if parsed.category() != Some(category) {
            return Err(StageError::OutputShape {
                output: fresh.to_string(),
                message: "revision emptied the category".to_string(),
            });
        }

        let resubmitted = self
            .table
            .submit(SAVE_TO_API, fresh, JobOptions::default())
            .map_err(queue_error)?;
        self.pending.remove(ctx.job_id).map_err(review_error)?;

        let from = save.feedback_from.as_deref().unwrap_or("reviewer");
        self.channel
            .edit_message(
                ctx.job_id,
                &format!(
                    "Revised {}: {} after feedback from {}; review follows.",
                    save.company_name,
                    category.label(),
                    from
                ),
            )
            .await
            .map_err(channel_error)?;

        tracing::info!(
            company = %save.company_name,
            category = key,
            %resubmitted,
            "feedback folded in, save resubmitted"
        );
        Ok(StageOutcome::Complete(json!({
            "revised": true,
            "resubmitted_as": resubmitted,
        })))
    }

    async fn commit(
        &self,
        ctx: &JobContext,
        save: &SavePayload,
        category: Category,
        company_exists: bool,
    ) -> Result<StageOutcome, StageError> {
        self.channel
            .edit_message(
                ctx.job_id,
                &format!("Saving {}: {}...", save.company_name, category.label()),
            )
            .await
            .map_err(channel_error)?;

        if !company_exists {
            let mut company = Company::new(save.company_id.clone(), save.company_name.as_str());
            if let Some(description) = &save.description {
                company = company.with_description(description.as_str());
            }
            self.store
                .upsert_company(&company)
                .await
                .map_err(store_error)?;
        }

        let records = match category {
            Category::Scope12 => self.save_scope12(save).await?,
            Category::Scope3 => self.save_scope3(save).await?,
            Category::Biogenic => self.save_biogenic(save).await?,
            Category::Economy => self.save_economy(save).await?,
            Category::Goals => self.save_goals(save).await?,
            Category::Initiatives => self.save_initiatives(save).await?,
            Category::Industry => self.save_industry(save).await?,
        };

        self.pending.remove(ctx.job_id).map_err(review_error)?;
        tracing::info!(
            company = %save.company_name,
            category = category.key(),
            records,
            verified = save.approved,
            "saved"
        );
        Ok(StageOutcome::Complete(json!({
            "saved": category.key(),
            "records": records,
            "verified": save.approved,
        })))
    }

    /// Provenance for every record this save writes. Only an approval
    /// carries a verification; first writes and no-change commits land
    /// unverified.
    fn stamp(&self, save: &SavePayload) -> Metadata {
        let mut metadata =
            Metadata::new(save.url.as_str(), EXTRACTOR).with_comment(EXTRACT_COMMENT);
        if save.approved {
            if let Some(reviewer) = &save.verified_by {
                metadata.verify(reviewer.as_str());
            }
        }
        metadata
    }

    fn period_key(&self, save: &SavePayload, year: i32) -> Result<PeriodKey, StageError> {
        let (start, end) = period_dates(
            year,
            save.fiscal_year.start_month,
            save.fiscal_year.end_month,
        )
        .map_err(|e| StageError::fatal(e.to_string()))?;
        PeriodKey::new(start, end).map_err(|e| StageError::fatal(e.to_string()))
    }

    async fn save_scope12(&self, save: &SavePayload) -> Result<usize, StageError> {
        let id = &save.company_id;
        let mut records = 0;
        for year in &save.scope12 {
            let key = self.period_key(save, year.year)?;
            self.store
                .create_reporting_period(id, &key, Some(save.url.as_str()))
                .await
                .map_err(store_error)?;
            if let Some(scope1) = &year.scope1 {
                let scope1 = scope1.clone().with_metadata(self.stamp(save));
                self.store
                    .upsert_scope1(id, &key, &scope1)
                    .await
                    .map_err(store_error)?;
                records += 1;
            }
            if let Some(scope2) = &year.scope2 {
                let scope2 = scope2.clone().with_metadata(self.stamp(save));
                self.store
                    .upsert_scope2(id, &key, &scope2)
                    .await
                    .map_err(store_error)?;
                records += 1;
            }
        }
        Ok(records)
    }

    async fn save_scope3(&self, save: &SavePayload) -> Result<usize, StageError> {
        let id = &save.company_id;
        let mut records = 0;
        for year in &save.scope3 {
            let key = self.period_key(save, year.year)?;
            self.store
                .create_reporting_period(id, &key, Some(save.url.as_str()))
                .await
                .map_err(store_error)?;
            let mut scope3 = year.scope3.clone();
            scope3.metadata = Some(self.stamp(save));
            for category in &mut scope3.categories {
                category.metadata = Some(self.stamp(save));
            }
            if let Some(stated) = &mut scope3.stated_total_emissions {
                stated.metadata = Some(self.stamp(save));
            }
            self.store
                .upsert_scope3(id, &key, &scope3)
                .await
                .map_err(store_error)?;
            records += 1;
        }
        Ok(records)
    }

    async fn save_biogenic(&self, save: &SavePayload) -> Result<usize, StageError> {
        let id = &save.company_id;
        let mut records = 0;
        for year in &save.biogenic {
            let key = self.period_key(save, year.year)?;
            self.store
                .create_reporting_period(id, &key, Some(save.url.as_str()))
                .await
                .map_err(store_error)?;
            let biogenic = year.biogenic.clone().with_metadata(self.stamp(save));
            self.store
                .upsert_biogenic(id, &key, &biogenic)
                .await
                .map_err(store_error)?;
            records += 1;
        }
        Ok(records)
    }

    async fn save_economy(&self, save: &SavePayload) -> Result<usize, StageError> {
        let id = &save.company_id;
        let mut records = 0;
        for year in &save.economy {
            let key = self.period_key(save, year.year)?;
            self.store
                .create_reporting_period(id, &key, Some(save.url.as_str()))
                .await
                .map_err(store_error)?;
            let mut economy = year.economy.clone();
            if let Some(turnover) = &mut economy.turnover {
                turnover.metadata = Some(self.stamp(save));
            }
            if let Some(employees) = &mut economy.employees {
                employees.metadata = Some(self.stamp(save));
            }
            self.store
                .upsert_economy(id, &key, &economy)
                .await
                .map_err(store_error)?;
            records += 1;
        }
        Ok(records)
    }

    async fn save_goals(&self, save: &SavePayload) -> Result<usize, StageError> {
        let goals: Vec<Goal> = save
            .goals
            .iter()
            .map(|g| g.clone().with_metadata(self.stamp(save)))
            .collect();
        self.store
            .replace_goals(&save.company_id, &goals)
            .await
            .map_err(store_error)?;
        Ok(goals.len())
    }

    async fn save_initiatives(&self, save: &SavePayload) -> Result<usize, StageError> {
        let initiatives: Vec<Initiative> = save
            .initiatives
            .iter()
            .map(|i| i.clone().with_metadata(self.stamp(save)))
            .collect();
        self.store
            .replace_initiatives(&save.company_id, &initiatives)
            .await
            .map_err(store_error)?;
        Ok(initiatives.len())
    }

    async fn save_industry(&self, save: &SavePayload) -> Result<usize, StageError> {
        let Some(industry) = &save.industry else {
            return Ok(0);
        };
        let industry = industry.clone().with_metadata(self.stamp(save));
        self.store
            .upsert_industry(&save.company_id, &industry)
            .await
            .map_err(store_error)?;
        Ok(1)
    }
}

#[async_trait]
impl StageHandler for SaveToApiStage {
    async fn run(&self, ctx: JobContext) -> Result<StageOutcome, StageError> {
        let save: SavePayload = ctx.parse()?;
        let Some(category) = save.category() else {
            return Err(StageError::fatal("no data to save"));
        };

        if save.superseded {
            // A retry callback already resubmitted this slice; this
            // incarnation steps aside without writing.
            self.pending.remove(ctx.job_id).map_err(review_error)?;
            return Ok(StageOutcome::Complete(json!({ "superseded": true })));
        }

        if save.rejected {
            self.pending.remove(ctx.job_id).map_err(review_error)?;
            let reviewer = save.rejected_by.as_deref().unwrap_or("reviewer");
            self.channel
                .notify(
                    ctx.job_id,
                    &format!(
                        "Discarded {}: {} after rejection by {}.",
                        save.company_name,
                        category.label(),
                        reviewer
                    ),
                )
                .await
                .map_err(channel_error)?;
            return Ok(StageOutcome::Complete(json!({ "rejected": true })));
        }

        if let Some(comment) = save.feedback.clone() {
            return self
                .revise_and_resubmit(&ctx, &save, category, &comment)
                .await;
        }

        let existing = self
            .store
            .get_company(&save.company_id)
            .await
            .map_err(store_error)?;

        if !save.approved {
            let before = before_slice(existing.as_ref(), category);
            let after = after_slice(&save, category)?;
            let proposal = Proposal::new(
                save.company_id.to_string(),
                save.company_name.as_str(),
                category.label(),
                before,
                after,
            );
            match self
                .gate
                .evaluate(ctx.job_id, &proposal)
                .await
                .map_err(review_error)?
            {
                GateDecision::Suspended { wake_at } => {
                    // A wake without a callback re-runs this path and
                    // re-prompts; the origin is what a retry callback
                    // resubmits.
                    self.pending
                        .register(
                            ctx.job_id,
                            ReviewOrigin::new(SAVE_TO_API, save.pristine(), JobOptions::default()),
                        )
                        .map_err(review_error)?;
                    return Ok(StageOutcome::Park { wake_at });
                }
                GateDecision::FirstWrite | GateDecision::NoChanges => {}
            }
        }

        self.commit(&ctx, &save, category, existing.is_some()).await
    }
}
