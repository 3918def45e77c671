// view.rs — Read model served to API consumers.
//
// Views wrap stored records with the derived totals from `totals`. They are
// serialize-only on purpose: calculated figures must never round-trip back
// into storage looking like reported data.

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::company::{Company, CompanySnapshot};
use crate::economy::Economy;
use crate::emissions::{
    BiogenicEmissions, Emissions, Scope1, Scope1And2, Scope2, Scope3, StatedTotalEmissions,
};
use crate::goal::{Goal, Initiative};
use crate::industry::Industry;
use crate::totals;

/// A company snapshot annotated with calculated totals.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyView {
    #[serde(flatten)]
    pub company: Company,

    pub reporting_periods: Vec<ReportingPeriodView>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<Industry>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<Goal>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub initiatives: Vec<Initiative>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportingPeriodView {
    pub id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub emissions: Option<EmissionsView>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub economy: Option<Economy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmissionsView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope1: Option<Scope1>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope2: Option<Scope2View>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope3: Option<Scope3View>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub biogenic: Option<BiogenicEmissions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope1_and_2: Option<Scope1And2>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stated_total_emissions: Option<StatedTotalEmissions>,

    /// Derived per-period figure, present even when zero.
    pub calculated_total_emissions: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Scope2View {
    #[serde(flatten)]
    pub scope2: Scope2,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculated_total_emissions: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Scope3View {
    #[serde(flatten)]
    pub scope3: Scope3,

    pub calculated_total_emissions: f64,
}

impl From<&CompanySnapshot> for CompanyView {
    fn from(snapshot: &CompanySnapshot) -> Self {
        Self {
            company: snapshot.company.clone(),
            reporting_periods: snapshot
                .reporting_periods
                .iter()
                .map(|period| ReportingPeriodView {
                    id: period.id,
                    start_date: period.start_date,
                    end_date: period.end_date,
                    report_url: period.report_url.clone(),
                    emissions: period.emissions.as_ref().map(annotate_emissions),
                    economy: period.economy.clone(),
                })
                .collect(),
            industry: snapshot.industry.clone(),
            goals: snapshot.goals.clone(),
            initiatives: snapshot.initiatives.clone(),
        }
    }
}

fn annotate_emissions(emissions: &Emissions) -> EmissionsView {
    EmissionsView {
        scope1: emissions.scope1.clone(),
        scope2: emissions.scope2.clone().map(|scope2| Scope2View {
            calculated_total_emissions: totals::scope2_calculated_total(&scope2),
            scope2,
        }),
        scope3: emissions.scope3.clone().map(|scope3| Scope3View {
            calculated_total_emissions: totals::scope3_calculated_total(&scope3),
            scope3,
        }),
        biogenic: emissions.biogenic.clone(),
        scope1_and_2: emissions.scope1_and_2.clone(),
        stated_total_emissions: emissions.stated_total_emissions.clone(),
        calculated_total_emissions: totals::period_calculated_total(emissions),
    }
}
