// company.rs — Company identity and the full per-company aggregate.
//
// Companies are keyed by their public knowledge-base node id rather than an
// internal surrogate, so independent pipeline runs over the same company
// converge on one record instead of creating duplicates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::goal::{Goal, Initiative};
use crate::industry::Industry;
use crate::period::ReportingPeriod;

/// Stable external identifier for a company: `Q` followed by digits,
/// e.g. `Q52825`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(String);

impl CompanyId {
    /// Validate and wrap a raw id.
    pub fn new(raw: impl Into<String>) -> Result<Self, ModelError> {
        let raw = raw.into();
        let digits = raw.strip_prefix('Q').unwrap_or("");
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ModelError::InvalidCompanyId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Company identity fields. Owned collections (periods, goals, industry)
/// live on [`CompanySnapshot`] so upserts can touch identity alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Company homepage, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Note for pipeline operators, never published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_comment: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Company {
    pub fn new(id: CompanyId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            url: None,
            internal_comment: None,
            tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Everything stored for one company. This is the shape entity stores
/// return from `get_company` and the shape the review gate diffs against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySnapshot {
    #[serde(flatten)]
    pub company: Company,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reporting_periods: Vec<ReportingPeriod>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<Industry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<Goal>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initiatives: Vec<Initiative>,
}

impl CompanySnapshot {
    pub fn new(company: Company) -> Self {
        Self {
            company,
            reporting_periods: Vec::new(),
            industry: None,
            goals: Vec::new(),
            initiatives: Vec::new(),
        }
    }

    /// The period ending on `end_date`, if one exists. `(company, end_date)`
    /// is the natural key periods are upserted under.
    pub fn period_ending(&self, end_date: chrono::NaiveDate) -> Option<&ReportingPeriod> {
        self.reporting_periods.iter().find(|p| p.end_date == end_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_company_ids_accepted() {
        assert!(CompanyId::new("Q52825").is_ok());
        assert!(CompanyId::new("Q1").is_ok());
    }

    #[test]
    fn malformed_company_ids_rejected() {
        for bad in ["", "Q", "52825", "QABC", "Q12X", "q123"] {
            assert!(
                CompanyId::new(bad).is_err(),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn company_id_serializes_as_plain_string() {
        let id = CompanyId::new("Q52825").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"Q52825\"");
    }

    #[test]
    fn snapshot_flattens_company_fields() {
        let company = Company::new(CompanyId::new("Q1").unwrap(), "Acme");
        let snapshot = CompanySnapshot::new(company);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["name"], "Acme");
        assert!(json.get("company").is_none());
    }

    #[test]
    fn period_ending_matches_on_end_date() {
        let company = Company::new(CompanyId::new("Q1").unwrap(), "Acme");
        let mut snapshot = CompanySnapshot::new(company);
        let period = crate::period::ReportingPeriod::new(
            chrono::NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2022, 12, 31).unwrap(),
        )
        .unwrap();
        snapshot.reporting_periods.push(period);

        let end = chrono::NaiveDate::from_ymd_opt(2022, 12, 31).unwrap();
        assert!(snapshot.period_ending(end).is_some());
        let other = chrono::NaiveDate::from_ymd_opt(2021, 12, 31).unwrap();
        assert!(snapshot.period_ending(other).is_none());
    }
}
