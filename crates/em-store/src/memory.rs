// memory.rs — The reference store: company aggregates in a mutex arena.
//
// Used by tests and the default daemon configuration. Semantics here are
// the contract HttpStore's server is expected to match, which is why the
// tests in this file double as the store conformance suite.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use em_model::{
    BiogenicEmissions, Company, CompanyId, CompanySnapshot, Economy, Goal, Industry, Initiative,
    ReportingPeriod, Scope1, Scope1And2, Scope2, Scope3, StatedTotalEmissions,
};

use crate::error::StoreError;
use crate::store::{EntityStore, PeriodKey};

/// In-memory entity store keyed by company id.
#[derive(Default)]
pub struct MemoryStore {
    companies: Mutex<HashMap<CompanyId, CompanySnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<MutexGuard<'_, HashMap<CompanyId, CompanySnapshot>>, StoreError> {
        self.companies
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    /// Run `apply` against the period row for `key`, creating the row
    /// first when absent. The company row is never created here.
    fn with_period<F>(&self, id: &CompanyId, key: &PeriodKey, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ReportingPeriod),
    {
        let mut companies = self.locked()?;
        let snapshot = companies
            .get_mut(id)
            .ok_or_else(|| StoreError::CompanyNotFound(id.clone()))?;
        apply(ensure_period(snapshot, key)?);
        Ok(())
    }
}

/// The period row for `key`, created from the key's dates on first use.
fn ensure_period<'a>(
    snapshot: &'a mut CompanySnapshot,
    key: &PeriodKey,
) -> Result<&'a mut ReportingPeriod, StoreError> {
    let index = snapshot
        .reporting_periods
        .iter()
        .position(|p| p.end_date == key.end_date);
    let index = match index {
        Some(i) => i,
        None => {
            let period = ReportingPeriod::new(key.start_date, key.end_date)?;
            snapshot.reporting_periods.push(period);
            snapshot.reporting_periods.len() - 1
        }
    };
    Ok(&mut snapshot.reporting_periods[index])
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn upsert_company(&self, company: &Company) -> Result<(), StoreError> {
        let mut companies = self.locked()?;
        match companies.get_mut(&company.id) {
            Some(snapshot) => {
                snapshot.company = company.clone();
                debug!(company = %company.id, "company identity updated");
            }
            None => {
                companies.insert(company.id.clone(), CompanySnapshot::new(company.clone()));
                debug!(company = %company.id, "company created");
            }
        }
        Ok(())
    }

    async fn get_company(&self, id: &CompanyId) -> Result<Option<CompanySnapshot>, StoreError> {
        Ok(self.locked()?.get(id).cloned())
    }

    async fn find_reporting_period(
        &self,
        id: &CompanyId,
        end_date: NaiveDate,
    ) -> Result<Option<ReportingPeriod>, StoreError> {
        Ok(self
            .locked()?
            .get(id)
            .and_then(|snapshot| snapshot.period_ending(end_date).cloned()))
    }

    async fn create_reporting_period(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        report_url: Option<&str>,
    ) -> Result<ReportingPeriod, StoreError> {
        let mut companies = self.locked()?;
        let snapshot = companies
            .get_mut(id)
            .ok_or_else(|| StoreError::CompanyNotFound(id.clone()))?;
        let period = ensure_period(snapshot, key)?;
        period.start_date = key.start_date;
        if let Some(url) = report_url {
            period.report_url = Some(url.to_string());
        }
        Ok(period.clone())
    }

    async fn upsert_scope1(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        scope1: &Scope1,
    ) -> Result<(), StoreError> {
        self.with_period(id, key, |period| {
            period.emissions_mut().scope1 = Some(scope1.clone());
        })
    }

    async fn upsert_scope2(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        scope2: &Scope2,
    ) -> Result<(), StoreError> {
        self.with_period(id, key, |period| {
            period.emissions_mut().scope2 = Some(scope2.clone());
        })
    }

    async fn upsert_scope3(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        scope3: &Scope3,
    ) -> Result<(), StoreError> {
        self.with_period(id, key, |period| {
            period.emissions_mut().scope3 = Some(scope3.clone());
        })
    }

    async fn upsert_biogenic(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        biogenic: &BiogenicEmissions,
    ) -> Result<(), StoreError> {
        self.with_period(id, key, |period| {
            period.emissions_mut().biogenic = Some(biogenic.clone());
        })
    }

    async fn upsert_scope1_and_2(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        combined: &Scope1And2,
    ) -> Result<(), StoreError> {
        self.with_period(id, key, |period| {
            period.emissions_mut().scope1_and_2 = Some(combined.clone());
        })
    }

    async fn upsert_stated_total(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        stated: &StatedTotalEmissions,
    ) -> Result<(), StoreError> {
        self.with_period(id, key, |period| {
            period.emissions_mut().stated_total_emissions = Some(stated.clone());
        })
    }

    async fn upsert_economy(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        economy: &Economy,
    ) -> Result<(), StoreError> {
        self.with_period(id, key, |period| {
            period.economy = Some(economy.clone());
        })
    }

    async fn upsert_industry(
        &self,
        id: &CompanyId,
        industry: &Industry,
    ) -> Result<(), StoreError> {
        let mut companies = self.locked()?;
        let snapshot = companies
            .get_mut(id)
            .ok_or_else(|| StoreError::CompanyNotFound(id.clone()))?;
        snapshot.industry = Some(industry.clone());
        Ok(())
    }

    async fn replace_goals(&self, id: &CompanyId, goals: &[Goal]) -> Result<(), StoreError> {
        let mut companies = self.locked()?;
        let snapshot = companies
            .get_mut(id)
            .ok_or_else(|| StoreError::CompanyNotFound(id.clone()))?;
        snapshot.goals = goals.to_vec();
        Ok(())
    }

    async fn replace_initiatives(
        &self,
        id: &CompanyId,
        initiatives: &[Initiative],
    ) -> Result<(), StoreError> {
        let mut companies = self.locked()?;
        let snapshot = companies
            .get_mut(id)
            .ok_or_else(|| StoreError::CompanyNotFound(id.clone()))?;
        snapshot.initiatives = initiatives.to_vec();
        Ok(())
    }
}
