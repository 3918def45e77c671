// payload.rs — Typed payloads for every pipeline stage.
//
// Payloads travel through the job table as JSON and grow as the pipeline
// progresses: stage results, fan-in child results, and reviewer-callback
// patches all deep-merge into the same object. Each stage parses the
// typed view below out of that object at entry, so a payload that no
// longer fits its stage fails loudly instead of half-working.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use em_model::{
    BiogenicEmissions, CompanyId, Economy, Goal, Industry, Initiative, Scope1, Scope2, Scope3,
};

/// Serialize infallibly. The payload types here contain nothing a JSON
/// tree cannot hold.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Self-correction feedback the engine folds into a payload after an
/// output-shape failure: the reply that failed and what was wrong with
/// it. Stages pass it back into their next completion ask.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_output: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_error: Option<String>,
}

/// `ingest` input: the report to search passages for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPayload {
    pub url: String,
}

/// `precheck` input: the passages ingest found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecheckPayload {
    pub url: String,
    pub paragraphs: Vec<String>,
}

/// `company_lookup` input.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupPayload {
    pub company_name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(flatten)]
    pub shape: ShapeFeedback,
}

/// `company_lookup` result, merged into the flow parent's payload under
/// the stage's name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyLookup {
    pub company_id: CompanyId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// `fiscal_year` input.
#[derive(Debug, Clone, Deserialize)]
pub struct FiscalPayload {
    pub paragraphs: Vec<String>,

    #[serde(flatten)]
    pub shape: ShapeFeedback,
}

/// The months bounding a company's fiscal year. Produced by the
/// `fiscal_year` child and consumed wherever a reporting year turns into
/// period dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalYear {
    pub start_month: u32,
    pub end_month: u32,
}

impl FiscalYear {
    /// January through December.
    pub const CALENDAR: FiscalYear = FiscalYear {
        start_month: 1,
        end_month: 12,
    };
}

/// `extract_emissions` input: the precheck base plus both child results.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractPayload {
    pub url: String,
    pub paragraphs: Vec<String>,
    pub company_name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub company_lookup: CompanyLookup,
    pub fiscal_year: FiscalYear,

    #[serde(flatten)]
    pub shape: ShapeFeedback,
}

/// Scope 1 and 2 figures for one reporting year, as extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope12Year {
    pub year: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope1: Option<Scope1>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope2: Option<Scope2>,
}

/// Scope 3 figures for one reporting year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope3Year {
    pub year: i32,
    pub scope3: Scope3,
}

/// Biogenic figure for one reporting year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiogenicYear {
    pub year: i32,
    pub biogenic: BiogenicEmissions,
}

/// Economy figures for one reporting year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyYear {
    pub year: i32,
    pub economy: Economy,
}

/// Everything `extract_emissions` pulls out of the passages. Absent keys
/// mean the report never stated that category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFacts {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope12: Vec<Scope12Year>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope3: Vec<Scope3Year>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub biogenic: Vec<BiogenicYear>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub economy: Vec<EconomyYear>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<Goal>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initiatives: Vec<Initiative>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<Industry>,
}

impl ExtractedFacts {
    pub fn is_empty(&self) -> bool {
        self.scope12.is_empty()
            && self.scope3.is_empty()
            && self.biogenic.is_empty()
            && self.economy.is_empty()
            && self.goals.is_empty()
            && self.initiatives.is_empty()
            && self.industry.is_none()
    }
}

/// The disclosure categories a save job can carry. The label is what
/// reviewers see in prompts and notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Scope12,
    Scope3,
    Biogenic,
    Economy,
    Goals,
    Initiatives,
    Industry,
}

impl Category {
    /// The payload key the category's data sits under.
    pub fn key(&self) -> &'static str {
        match self {
            Category::Scope12 => "scope12",
            Category::Scope3 => "scope3",
            Category::Biogenic => "biogenic",
            Category::Economy => "economy",
            Category::Goals => "goals",
            Category::Initiatives => "initiatives",
            Category::Industry => "industry",
        }
    }

    /// Reviewer-facing name.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Scope12 => "scope 1+2 emissions",
            Category::Scope3 => "scope 3 emissions",
            Category::Biogenic => "biogenic emissions",
            Category::Economy => "economy",
            Category::Goals => "goals",
            Category::Initiatives => "initiatives",
            Category::Industry => "industry",
        }
    }
}

/// `save_to_api` input: one company, one disclosure category, plus the
/// flags reviewer callbacks patch in while the job is parked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePayload {
    pub url: String,
    pub company_id: CompanyId,
    pub company_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub fiscal_year: FiscalYear,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope12: Vec<Scope12Year>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope3: Vec<Scope3Year>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub biogenic: Vec<BiogenicYear>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub economy: Vec<EconomyYear>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<Goal>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initiatives: Vec<Initiative>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<Industry>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub approved: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub rejected: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub superseded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_from: Option<String>,

    #[serde(flatten)]
    pub shape: ShapeFeedback,
}

impl SavePayload {
    /// The one category this save carries. Fan-out submits exactly one
    /// per job; `None` means there is nothing to save.
    pub fn category(&self) -> Option<Category> {
        if !self.scope12.is_empty() {
            Some(Category::Scope12)
        } else if !self.scope3.is_empty() {
            Some(Category::Scope3)
        } else if !self.biogenic.is_empty() {
            Some(Category::Biogenic)
        } else if self.industry.is_some() {
            Some(Category::Industry)
        } else if !self.goals.is_empty() {
            Some(Category::Goals)
        } else if !self.initiatives.is_empty() {
            Some(Category::Initiatives)
        } else if !self.economy.is_empty() {
            Some(Category::Economy)
        } else {
            None
        }
    }

    /// The payload as the save began: category data only, every callback
    /// flag and self-correction leftover cleared. This is what a `retry`
    /// re-submission and a feedback revision start from.
    pub fn pristine(&self) -> Value {
        let mut clean = self.clone();
        clean.approved = false;
        clean.rejected = false;
        clean.superseded = false;
        clean.feedback = None;
        clean.verified_by = None;
        clean.rejected_by = None;
        clean.feedback_from = None;
        clean.shape = ShapeFeedback::default();
        to_json(&clean)
    }
}
