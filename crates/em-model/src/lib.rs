//! # em-model
//!
//! Disclosure data model for Emissary: companies, reporting periods,
//! scoped greenhouse-gas emissions, economy figures, and the verification
//! metadata attached to every reported value.
//!
//! The model is deliberately strict at construction time — reporting
//! periods must start before they end, scope 2 must carry at least one of
//! its three variants, scope 3 category codes live in 1..=16 — because a
//! record that exists is assumed valid everywhere downstream.
//!
//! ## Key components
//!
//! - [`Company`] / [`ReportingPeriod`] — aggregate roots keyed by
//!   knowledge-base id and `(company, end_date)`
//! - [`Emissions`] — per-period scope 1/2/3, biogenic and combined values
//! - [`Metadata`] — provenance plus the verifying reviewer; a value is
//!   trusted exactly when `verified_by` is set
//! - [`totals`] — the calculated-total derivation rules (pure, no I/O)
//! - [`view`] — read model annotating snapshots with calculated totals

pub mod company;
pub mod economy;
pub mod emissions;
pub mod error;
pub mod goal;
pub mod industry;
pub mod metadata;
pub mod period;
pub mod totals;
pub mod view;

pub use company::{Company, CompanyId, CompanySnapshot};
pub use economy::{Economy, Employees, Turnover};
pub use emissions::{
    BiogenicEmissions, Emissions, Scope1, Scope1And2, Scope2, Scope3, Scope3Category,
    StatedTotalEmissions,
};
pub use error::ModelError;
pub use goal::{Goal, Initiative};
pub use industry::Industry;
pub use metadata::Metadata;
pub use period::{period_dates, ReportingPeriod};
pub use view::CompanyView;
