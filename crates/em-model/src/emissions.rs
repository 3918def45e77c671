// emissions.rs — Scoped greenhouse-gas value objects.
//
// Figures are normalized to tonnes CO2 equivalent before they reach this
// model; the unit field is carried for the read API, not for conversion.
// Scope 2 is special twice over: its three variants (market-based,
// location-based, unspecified) are alternatives rather than parts, and at
// least one must be present for the record to mean anything.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::metadata::Metadata;

/// Every stored figure is tonnes of CO2 equivalent.
pub const UNIT_TCO2E: &str = "tCO2e";

fn default_unit() -> String {
    UNIT_TCO2E.to_string()
}

/// All emissions recorded for one reporting period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Emissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope1: Option<Scope1>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope2: Option<Scope2>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope3: Option<Scope3>,

    /// Biogenic CO2 is reported outside the scopes and never aggregated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biogenic: Option<BiogenicEmissions>,

    /// Combined figure for companies that do not split scope 1 from 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope1_and_2: Option<Scope1And2>,

    /// Company-stated overall total, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stated_total_emissions: Option<StatedTotalEmissions>,
}

/// Direct emissions from owned or controlled sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope1 {
    pub total: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Scope1 {
    pub fn new(total: f64) -> Self {
        Self {
            total,
            unit: default_unit(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Purchased-energy emissions. `mb`, `lb` and `unknown` are three
/// measurements of the same electricity, so they are alternatives: the
/// preferred figure is picked by precedence, never summed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope2 {
    /// Market-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mb: Option<f64>,

    /// Location-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lb: Option<f64>,

    /// Reported without method information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown: Option<f64>,

    #[serde(default = "default_unit")]
    pub unit: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Scope2 {
    /// At least one variant must be present.
    pub fn new(
        mb: Option<f64>,
        lb: Option<f64>,
        unknown: Option<f64>,
    ) -> Result<Self, ModelError> {
        if mb.is_none() && lb.is_none() && unknown.is_none() {
            return Err(ModelError::EmptyScope2);
        }
        Ok(Self {
            mb,
            lb,
            unknown,
            unit: default_unit(),
            metadata: None,
        })
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Value-chain emissions, split into the sixteen standard categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope3 {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Scope3Category>,

    /// The company's own scope 3 total, kept alongside the categories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stated_total_emissions: Option<StatedTotalEmissions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// One scope 3 category figure. Codes 1 through 15 are the standard
/// upstream/downstream categories; 16 is "other".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope3Category {
    pub category: u8,

    /// Companies sometimes report a category with no figure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,

    #[serde(default = "default_unit")]
    pub unit: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Scope3Category {
    pub fn new(category: u8, total: Option<f64>) -> Result<Self, ModelError> {
        if !(1..=16).contains(&category) {
            return Err(ModelError::Scope3Category(category));
        }
        Ok(Self {
            category,
            total,
            unit: default_unit(),
            metadata: None,
        })
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// CO2 from burning biomass, reported separately from the scopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiogenicEmissions {
    pub total: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl BiogenicEmissions {
    pub fn new(total: f64) -> Self {
        Self {
            total,
            unit: default_unit(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Combined scope 1 + 2 for companies that do not report them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope1And2 {
    pub total: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Scope1And2 {
    pub fn new(total: f64) -> Self {
        Self {
            total,
            unit: default_unit(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A total the company itself published, preserved verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatedTotalEmissions {
    pub total: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl StatedTotalEmissions {
    pub fn new(total: f64) -> Self {
        Self {
            total,
            unit: default_unit(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
