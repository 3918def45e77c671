// slice.rs — Before/after slices for the review gate.
//
// The gate diffs the narrowest view that still shows the change: only
// the fields the save touches, with provenance metadata stripped so two
// extractions of the same figures compare equal. A `null` before slice
// means the company holds nothing in this category yet, which the gate
// treats as a first write.

use serde_json::{json, Map, Value};

use em_model::{period_dates, CompanySnapshot, Emissions};
use em_queue::StageError;

use crate::payload::{to_json, Category, SavePayload};

/// Remove provenance metadata at every level so slices compare by value.
pub fn strip_metadata(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("metadata");
            for nested in map.values_mut() {
                strip_metadata(nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_metadata(item);
            }
        }
        _ => {}
    }
}

/// What the store already holds in this category, narrowed to the fields
/// the save would touch. `Null` when there is nothing to compare against.
pub fn before_slice(existing: Option<&CompanySnapshot>, category: Category) -> Value {
    let Some(company) = existing else {
        return Value::Null;
    };

    let mut before = match category {
        Category::Scope12 | Category::Scope3 | Category::Biogenic => {
            if company.reporting_periods.is_empty() {
                return Value::Null;
            }
            let rows: Vec<Value> = company
                .reporting_periods
                .iter()
                .map(|period| {
                    let mut row = json!({
                        "start_date": period.start_date,
                        "end_date": period.end_date,
                    });
                    let narrowed = period
                        .emissions
                        .as_ref()
                        .and_then(|emissions| narrowed_emissions(emissions, category));
                    if let Some(emissions) = narrowed {
                        row["emissions"] = emissions;
                    }
                    row
                })
                .collect();
            json!({ "reporting_periods": rows })
        }
        Category::Economy => {
            if company.reporting_periods.is_empty() {
                return Value::Null;
            }
            let rows: Vec<Value> = company
                .reporting_periods
                .iter()
                .map(|period| {
                    let mut row = json!({
                        "start_date": period.start_date,
                        "end_date": period.end_date,
                    });
                    if let Some(economy) = &period.economy {
                        row["economy"] = to_json(economy);
                    }
                    row
                })
                .collect();
            json!({ "reporting_periods": rows })
        }
        Category::Goals => {
            if company.goals.is_empty() {
                return Value::Null;
            }
            json!({ "goals": &company.goals })
        }
        Category::Initiatives => {
            if company.initiatives.is_empty() {
                return Value::Null;
            }
            json!({ "initiatives": &company.initiatives })
        }
        Category::Industry => match &company.industry {
            Some(industry) => json!({ "industry": industry }),
            None => return Value::Null,
        },
    };

    strip_metadata(&mut before);
    before
}

/// The proposed state of the category, shaped exactly like the before
/// slice. Reporting years become dated periods via the fiscal months;
/// out-of-range months are a domain violation, not a retry candidate.
pub fn after_slice(save: &SavePayload, category: Category) -> Result<Value, StageError> {
    let mut after = match category {
        Category::Scope12 => {
            let mut rows = Vec::with_capacity(save.scope12.len());
            for year in &save.scope12 {
                let mut row = period_row(save, year.year)?;
                let mut emissions = Map::new();
                if let Some(scope1) = &year.scope1 {
                    emissions.insert("scope1".to_string(), to_json(scope1));
                }
                if let Some(scope2) = &year.scope2 {
                    emissions.insert("scope2".to_string(), to_json(scope2));
                }
                if !emissions.is_empty() {
                    row["emissions"] = Value::Object(emissions);
                }
                rows.push(row);
            }
            json!({ "reporting_periods": rows })
        }
        Category::Scope3 => {
            let mut rows = Vec::with_capacity(save.scope3.len());
            for year in &save.scope3 {
                let mut row = period_row(save, year.year)?;
                row["emissions"] = json!({ "scope3": &year.scope3 });
                rows.push(row);
            }
            json!({ "reporting_periods": rows })
        }
        Category::Biogenic => {
            let mut rows = Vec::with_capacity(save.biogenic.len());
            for year in &save.biogenic {
                let mut row = period_row(save, year.year)?;
                row["emissions"] = json!({ "biogenic": &year.biogenic });
                rows.push(row);
            }
            json!({ "reporting_periods": rows })
        }
        Category::Economy => {
            let mut rows = Vec::with_capacity(save.economy.len());
            for year in &save.economy {
                let mut row = period_row(save, year.year)?;
                row["economy"] = to_json(&year.economy);
                rows.push(row);
            }
            json!({ "reporting_periods": rows })
        }
        Category::Goals => json!({ "goals": &save.goals }),
        Category::Initiatives => json!({ "initiatives": &save.initiatives }),
        Category::Industry => json!({ "industry": &save.industry }),
    };

    strip_metadata(&mut after);
    Ok(after)
}

fn period_row(save: &SavePayload, year: i32) -> Result<Value, StageError> {
    let (start, end) = period_dates(
        year,
        save.fiscal_year.start_month,
        save.fiscal_year.end_month,
    )
    .map_err(|e| StageError::fatal(e.to_string()))?;
    Ok(json!({ "start_date": start, "end_date": end }))
}

fn narrowed_emissions(emissions: &Emissions, category: Category) -> Option<Value> {
    let mut map = Map::new();
    match category {
        Category::Scope12 => {
            if let Some(scope1) = &emissions.scope1 {
                map.insert("scope1".to_string(), to_json(scope1));
            }
            if let Some(scope2) = &emissions.scope2 {
                map.insert("scope2".to_string(), to_json(scope2));
            }
        }
        Category::Scope3 => {
            if let Some(scope3) = &emissions.scope3 {
                map.insert("scope3".to_string(), to_json(scope3));
            }
        }
        Category::Biogenic => {
            if let Some(biogenic) = &emissions.biogenic {
                map.insert("biogenic".to_string(), to_json(biogenic));
            }
        }
        _ => {}
    }
    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}
