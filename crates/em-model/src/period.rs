// period.rs — Reporting periods and fiscal-year date derivation.
//
// A reporting period is one fiscal year of one company. Periods are never
// keyed by "year" directly because fiscal years straddle calendar years;
// the natural key is (company, end_date) and the dates are derived from the
// company's fiscal month pair.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::economy::Economy;
use crate::emissions::Emissions;
use crate::error::ModelError;

/// One fiscal year of disclosure data for a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub id: Uuid,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    /// The report the figures were extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emissions: Option<Emissions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economy: Option<Economy>,
}

impl ReportingPeriod {
    /// Create an empty period. Fails when the dates are out of order —
    /// a period that ends before it starts can never be stored.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, ModelError> {
        if start_date >= end_date {
            return Err(ModelError::PeriodOrder {
                start: start_date,
                end: end_date,
            });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            start_date,
            end_date,
            report_url: None,
            emissions: None,
            economy: None,
        })
    }

    pub fn with_report_url(mut self, url: impl Into<String>) -> Self {
        self.report_url = Some(url.into());
        self
    }

    /// Emissions container, created on first use.
    pub fn emissions_mut(&mut self) -> &mut Emissions {
        self.emissions.get_or_insert_with(Emissions::default)
    }

    /// Economy container, created on first use.
    pub fn economy_mut(&mut self) -> &mut Economy {
        self.economy.get_or_insert_with(Economy::default)
    }
}

/// Derive the period dates for `year` given a company's fiscal months.
///
/// The period runs from the first day of `start_month` to the last day of
/// `end_month`. A fiscal year that starts in or after its end month began
/// the previous calendar year: year 2022 with months (4, 3) means
/// 2021-04-01 through 2022-03-31.
pub fn period_dates(
    year: i32,
    start_month: u32,
    end_month: u32,
) -> Result<(NaiveDate, NaiveDate), ModelError> {
    if !(1..=12).contains(&start_month) {
        return Err(ModelError::Month(start_month));
    }
    if !(1..=12).contains(&end_month) {
        return Err(ModelError::Month(end_month));
    }

    let start_year = if start_month >= end_month { year - 1 } else { year };
    let start = NaiveDate::from_ymd_opt(start_year, start_month, 1)
        .ok_or(ModelError::Month(start_month))?;
    let end = NaiveDate::from_ymd_opt(year, end_month, last_day_of_month(year, end_month))
        .ok_or(ModelError::Month(end_month))?;
    Ok((start, end))
}

/// 28 through 31, leap-years included.
fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_requires_start_before_end() {
        let err = ReportingPeriod::new(date(2022, 12, 31), date(2022, 1, 1));
        assert!(matches!(err, Err(ModelError::PeriodOrder { .. })));

        // Equal dates are out of order too.
        let err = ReportingPeriod::new(date(2022, 1, 1), date(2022, 1, 1));
        assert!(matches!(err, Err(ModelError::PeriodOrder { .. })));
    }

    #[test]
    fn calendar_year_dates() {
        let (start, end) = period_dates(2022, 1, 12).unwrap();
        assert_eq!(start, date(2022, 1, 1));
        assert_eq!(end, date(2022, 12, 31));
    }

    #[test]
    fn broken_fiscal_year_starts_previous_calendar_year() {
        // April 2021 through March 2022 reported as year 2022.
        let (start, end) = period_dates(2022, 4, 3).unwrap();
        assert_eq!(start, date(2021, 4, 1));
        assert_eq!(end, date(2022, 3, 31));
    }

    #[test]
    fn fiscal_year_ending_in_leap_february() {
        let (start, end) = period_dates(2024, 3, 2).unwrap();
        assert_eq!(start, date(2023, 3, 1));
        assert_eq!(end, date(2024, 2, 29));
    }

    #[test]
    fn same_start_and_end_month_spans_a_year() {
        // July to July reads as July previous year through end of July.
        let (start, end) = period_dates(2022, 7, 7).unwrap();
        assert_eq!(start, date(2021, 7, 1));
        assert_eq!(end, date(2022, 7, 31));
    }

    #[test]
    fn month_out_of_range_rejected() {
        assert!(matches!(period_dates(2022, 0, 12), Err(ModelError::Month(0))));
        assert!(matches!(period_dates(2022, 1, 13), Err(ModelError::Month(13))));
    }

    #[test]
    fn last_days_of_months() {
        assert_eq!(last_day_of_month(2022, 2), 28);
        assert_eq!(last_day_of_month(2024, 2), 29);
        assert_eq!(last_day_of_month(2022, 12), 31);
        assert_eq!(last_day_of_month(2022, 4), 30);
    }
}
