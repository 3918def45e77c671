// totals.rs — Calculated-total derivation for reporting periods.
//
// Reported figures arrive scattered: scope 1, three scope 2 variants,
// sixteen scope 3 categories, a combined scope 1+2 and company-stated
// totals. These rules reconcile them into one comparable number per period.
// Everything here is pure; derived totals are computed on read and never
// written back, so re-running extraction can only change inputs.
//
// "No data" and "zero" stay distinct in the structures (Option fields);
// zero only appears here, as the additive identity during reconciliation.

use crate::emissions::{Emissions, Scope2, Scope3};
use crate::metadata::Metadata;

/// Preferred scope 2 figure: market-based, then location-based, then
/// unspecified. The variants measure the same purchased energy, so they
/// are never summed. `None` when no variant is present.
pub fn scope2_calculated_total(scope2: &Scope2) -> Option<f64> {
    scope2.mb.or(scope2.lb).or(scope2.unknown)
}

/// Scope 3 total for one period.
///
/// Once any category has been human-verified the category records are
/// trusted over the company's own figure: the result is the sum of the
/// numeric category totals (categories reported without a figure
/// contribute zero). With no verified category the company-stated scope 3
/// total stands in, defaulting to zero when absent.
pub fn scope3_calculated_total(scope3: &Scope3) -> f64 {
    let any_verified = scope3
        .categories
        .iter()
        .any(|c| is_verified(c.metadata.as_ref()));

    if any_verified {
        scope3.categories.iter().filter_map(|c| c.total).sum()
    } else {
        scope3
            .stated_total_emissions
            .as_ref()
            .map(|stated| stated.total)
            .unwrap_or(0.0)
    }
}

/// The single comparable total for one period.
///
/// When scope 1 or scope 2 carries verification the two scopes contribute
/// individually (scope 2 via its calculated figure); otherwise a combined
/// scope 1+2 value stands in for both when the company reported one. With
/// no combined figure there is nothing coarser to prefer, so the separate
/// figures count even unverified. Scope 3 is added on top either way.
pub fn period_calculated_total(emissions: &Emissions) -> f64 {
    let scope1_verified = emissions
        .scope1
        .as_ref()
        .map(|s| is_verified(s.metadata.as_ref()))
        .unwrap_or(false);
    let scope2_verified = emissions
        .scope2
        .as_ref()
        .map(|s| is_verified(s.metadata.as_ref()))
        .unwrap_or(false);

    let separate = || {
        let scope1 = emissions.scope1.as_ref().map(|s| s.total).unwrap_or(0.0);
        let scope2 = emissions
            .scope2
            .as_ref()
            .and_then(scope2_calculated_total)
            .unwrap_or(0.0);
        scope1 + scope2
    };

    let scope1_and_2 = if scope1_verified || scope2_verified {
        separate()
    } else {
        emissions
            .scope1_and_2
            .as_ref()
            .map(|s| s.total)
            .unwrap_or_else(separate)
    };

    let scope3 = emissions
        .scope3
        .as_ref()
        .map(scope3_calculated_total)
        .unwrap_or(0.0);

    scope1_and_2 + scope3
}

fn is_verified(metadata: Option<&Metadata>) -> bool {
    metadata.is_some_and(Metadata::is_verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emissions::{Scope1, Scope1And2, Scope3Category, StatedTotalEmissions};
    use crate::metadata::Metadata;

    fn verified_meta() -> Metadata {
        let mut meta = Metadata::new("report.pdf", "extractor");
        meta.verify("reviewer");
        meta
    }

    fn unverified_meta() -> Metadata {
        Metadata::new("report.pdf", "extractor")
    }

    #[test]
    fn scope2_prefers_market_based() {
        let scope2 = Scope2::new(Some(10.0), Some(20.0), Some(30.0)).unwrap();
        assert_eq!(scope2_calculated_total(&scope2), Some(10.0));
    }

    #[test]
    fn scope2_falls_back_to_location_based_then_unknown() {
        let lb_only = Scope2::new(None, Some(20.0), Some(30.0)).unwrap();
        assert_eq!(scope2_calculated_total(&lb_only), Some(20.0));

        let unknown_only = Scope2::new(None, None, Some(30.0)).unwrap();
        assert_eq!(scope2_calculated_total(&unknown_only), Some(30.0));
    }

    #[test]
    fn scope2_single_field_equals_that_field() {
        for (mb, lb, unknown, expected) in [
            (Some(5.0), None, None, 5.0),
            (None, Some(6.0), None, 6.0),
            (None, None, Some(7.0), 7.0),
        ] {
            let scope2 = Scope2::new(mb, lb, unknown).unwrap();
            assert_eq!(scope2_calculated_total(&scope2), Some(expected));
        }
    }

    #[test]
    fn scope2_zero_market_based_is_kept_not_skipped() {
        let scope2 = Scope2::new(Some(0.0), Some(20.0), None).unwrap();
        assert_eq!(scope2_calculated_total(&scope2), Some(0.0));
    }

    #[test]
    fn scope3_unverified_uses_stated_total() {
        let scope3 = Scope3 {
            categories: vec![
                Scope3Category::new(1, Some(100.0))
                    .unwrap()
                    .with_metadata(unverified_meta()),
                Scope3Category::new(3, Some(200.0))
                    .unwrap()
                    .with_metadata(unverified_meta()),
            ],
            stated_total_emissions: Some(StatedTotalEmissions::new(999.0)),
            metadata: None,
        };
        assert_eq!(scope3_calculated_total(&scope3), 999.0);
    }

    #[test]
    fn scope3_any_verified_category_switches_to_category_sum() {
        let scope3 = Scope3 {
            categories: vec![
                Scope3Category::new(1, Some(100.0))
                    .unwrap()
                    .with_metadata(verified_meta()),
                Scope3Category::new(3, Some(200.0))
                    .unwrap()
                    .with_metadata(unverified_meta()),
            ],
            stated_total_emissions: Some(StatedTotalEmissions::new(999.0)),
            metadata: None,
        };
        // One verified category is enough; the stated total is ignored.
        assert_eq!(scope3_calculated_total(&scope3), 300.0);
    }

    #[test]
    fn scope3_categories_without_totals_contribute_zero() {
        let scope3 = Scope3 {
            categories: vec![
                Scope3Category::new(1, Some(100.0))
                    .unwrap()
                    .with_metadata(verified_meta()),
                Scope3Category::new(2, None).unwrap(),
            ],
            stated_total_emissions: None,
            metadata: None,
        };
        assert_eq!(scope3_calculated_total(&scope3), 100.0);
    }

    #[test]
    fn scope3_nothing_reported_is_zero() {
        assert_eq!(scope3_calculated_total(&Scope3::default()), 0.0);
    }

    #[test]
    fn period_total_unverified_uses_combined_scope1_and_2() {
        let emissions = Emissions {
            scope1: Some(Scope1::new(100.0).with_metadata(unverified_meta())),
            scope2: Some(
                Scope2::new(Some(50.0), None, None)
                    .unwrap()
                    .with_metadata(unverified_meta()),
            ),
            scope1_and_2: Some(Scope1And2::new(400.0)),
            ..Default::default()
        };
        assert_eq!(period_calculated_total(&emissions), 400.0);
    }

    #[test]
    fn period_total_without_combined_counts_separate_figures_unverified() {
        let emissions = Emissions {
            scope1: Some(Scope1::new(100.0).with_metadata(unverified_meta())),
            scope2: Some(
                Scope2::new(Some(50.0), None, None)
                    .unwrap()
                    .with_metadata(unverified_meta()),
            ),
            ..Default::default()
        };
        assert_eq!(period_calculated_total(&emissions), 150.0);
    }

    #[test]
    fn period_total_verified_scope1_unlocks_individual_scopes() {
        let emissions = Emissions {
            scope1: Some(Scope1::new(100.0).with_metadata(verified_meta())),
            scope2: Some(Scope2::new(Some(50.0), None, None).unwrap()),
            scope1_and_2: Some(Scope1And2::new(400.0)),
            ..Default::default()
        };
        assert_eq!(period_calculated_total(&emissions), 150.0);
    }

    #[test]
    fn period_total_verified_scope2_is_sufficient() {
        let emissions = Emissions {
            scope1: Some(Scope1::new(100.0)),
            scope2: Some(
                Scope2::new(None, Some(50.0), None)
                    .unwrap()
                    .with_metadata(verified_meta()),
            ),
            ..Default::default()
        };
        assert_eq!(period_calculated_total(&emissions), 150.0);
    }

    #[test]
    fn period_total_adds_scope3_on_top() {
        let emissions = Emissions {
            scope1_and_2: Some(Scope1And2::new(400.0)),
            scope3: Some(Scope3 {
                categories: Vec::new(),
                stated_total_emissions: Some(StatedTotalEmissions::new(600.0)),
                metadata: None,
            }),
            ..Default::default()
        };
        assert_eq!(period_calculated_total(&emissions), 1000.0);
    }

    #[test]
    fn period_total_of_empty_emissions_is_zero() {
        assert_eq!(period_calculated_total(&Emissions::default()), 0.0);
    }

    #[test]
    fn biogenic_never_enters_the_total() {
        let emissions = Emissions {
            scope1: Some(Scope1::new(100.0).with_metadata(verified_meta())),
            biogenic: Some(crate::emissions::BiogenicEmissions::new(5000.0)),
            ..Default::default()
        };
        assert_eq!(period_calculated_total(&emissions), 100.0);
    }
}
