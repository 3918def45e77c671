//! # em-pipeline
//!
//! The extraction pipeline: every stage between a report URL and a
//! committed disclosure record.
//!
//! Stages are [`em_queue::StageHandler`]s chained through the job table.
//! `ingest` retrieves relevant report passages, `precheck` identifies
//! the company and opens a flow whose children (`company_lookup`,
//! `fiscal_year`) resolve the facts extraction depends on, the flow
//! parent `extract_emissions` pulls every disclosure category out of the
//! passages, and one `save_to_api` job per category carries the proposed
//! write through the review gate into the entity store.
//!
//! External calls go through seams: [`em_review::CompletionBackend`] for
//! language-model asks, [`search::DocumentSearch`] for passage retrieval,
//! [`em_store::EntityStore`] for persistence. Everything here is
//! deterministic given those three.

pub mod completion;
pub mod payload;
pub mod reviser;
pub mod search;
pub mod slice;
pub mod stages;

pub use payload::{
    Category, CompanyLookup, ExtractedFacts, FiscalYear, SavePayload, ShapeFeedback,
};
pub use reviser::ProposalReviser;
pub use search::{DocumentSearch, SearchError, StaticSearch};
pub use stages::{
    CompanyLookupStage, ExtractEmissionsStage, FiscalYearStage, IngestStage, PrecheckStage,
    SaveToApiStage,
};
