// error.rs — Error types for the disclosure data model.
//
// Every variant here is a domain-invariant violation: the caller sent data
// that can never be stored, so these are fatal for the job that produced
// them rather than retryable.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised when constructing model values from untrusted input.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Company ids are knowledge-base node ids: `Q` followed by digits.
    #[error("invalid company id {0:?} (expected e.g. Q52825)")]
    InvalidCompanyId(String),

    /// A reporting period must start strictly before it ends.
    #[error("reporting period starts {start} but ends {end}")]
    PeriodOrder { start: NaiveDate, end: NaiveDate },

    /// Scope 2 needs at least one of the market-based, location-based or
    /// unspecified figures.
    #[error("scope 2 carries none of mb, lb, unknown")]
    EmptyScope2,

    /// Scope 3 categories are numbered 1 through 16 (16 = other).
    #[error("scope 3 category {0} outside 1..=16")]
    Scope3Category(u8),

    /// Calendar months are 1 through 12.
    #[error("month {0} outside 1..=12")]
    Month(u32),
}
