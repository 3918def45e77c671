// store.rs — The persistence contract every store implementation honors.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use em_model::{
    BiogenicEmissions, Company, CompanyId, CompanySnapshot, Economy, Goal, Industry, Initiative,
    ReportingPeriod, Scope1, Scope1And2, Scope2, Scope3, StatedTotalEmissions,
};

use crate::error::StoreError;

/// The dates identifying one reporting period. The upsert key is
/// `(company, end_date)`; the start date rides along because period rows
/// are created on first write and need both bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodKey {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl PeriodKey {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, StoreError> {
        if start_date >= end_date {
            return Err(StoreError::Constraint(em_model::ModelError::PeriodOrder {
                start: start_date,
                end: end_date,
            }));
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    pub fn from_period(period: &ReportingPeriod) -> Self {
        Self {
            start_date: period.start_date,
            end_date: period.end_date,
        }
    }

    /// The year a period is referred to by: the final year of its range.
    pub fn year(&self) -> i32 {
        self.end_date.year()
    }
}

/// Everything the pipeline persists, as upserts on natural keys.
///
/// Period-scoped writes (`upsert_scope1` through `upsert_economy`) create
/// the period row from the key when it does not exist yet, so the writes
/// for one period can land in any order. The company row is never created
/// implicitly: callers upsert it first, and a write against an unknown
/// company is an error.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Create the company or update its identity fields. Owned
    /// collections (periods, goals, industry) are untouched.
    async fn upsert_company(&self, company: &Company) -> Result<(), StoreError>;

    /// The full stored aggregate, or `None` for an unknown company.
    async fn get_company(&self, id: &CompanyId) -> Result<Option<CompanySnapshot>, StoreError>;

    async fn find_reporting_period(
        &self,
        id: &CompanyId,
        end_date: NaiveDate,
    ) -> Result<Option<ReportingPeriod>, StoreError>;

    /// Upsert the period row itself. An existing `(company, end_date)`
    /// row is reused with its dates and report url refreshed; emissions
    /// and economy data already on it survive.
    async fn create_reporting_period(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        report_url: Option<&str>,
    ) -> Result<ReportingPeriod, StoreError>;

    async fn upsert_scope1(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        scope1: &Scope1,
    ) -> Result<(), StoreError>;

    async fn upsert_scope2(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        scope2: &Scope2,
    ) -> Result<(), StoreError>;

    async fn upsert_scope3(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        scope3: &Scope3,
    ) -> Result<(), StoreError>;

    async fn upsert_biogenic(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        biogenic: &BiogenicEmissions,
    ) -> Result<(), StoreError>;

    async fn upsert_scope1_and_2(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        combined: &Scope1And2,
    ) -> Result<(), StoreError>;

    async fn upsert_stated_total(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        stated: &StatedTotalEmissions,
    ) -> Result<(), StoreError>;

    async fn upsert_economy(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        economy: &Economy,
    ) -> Result<(), StoreError>;

    async fn upsert_industry(
        &self,
        id: &CompanyId,
        industry: &Industry,
    ) -> Result<(), StoreError>;

    /// Swap the whole goal list. Replace-all keeps retried saves from
    /// duplicating entries.
    async fn replace_goals(&self, id: &CompanyId, goals: &[Goal]) -> Result<(), StoreError>;

    /// Swap the whole initiative list.
    async fn replace_initiatives(
        &self,
        id: &CompanyId,
        initiatives: &[Initiative],
    ) -> Result<(), StoreError>;
}
