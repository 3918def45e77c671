// economy.rs — Financial figures reported alongside emissions.

use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

/// Turnover and headcount for one reporting period. Both halves are
/// optional; reports routinely state one without the other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Economy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turnover: Option<Turnover>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employees: Option<Employees>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Turnover {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    /// ISO currency code as printed in the report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Employees {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    /// How headcount was counted, e.g. "FTE".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}
