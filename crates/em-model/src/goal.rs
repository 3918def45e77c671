// goal.rs — Climate goals and initiatives a company has announced.
//
// Goals and initiatives are stored with replace-all semantics (the whole
// list is swapped on save) so a retried save never duplicates entries.

use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

/// A stated emissions-reduction target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,

    /// Target year or range as printed, e.g. "2030" or "2025-2030".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,

    /// Reduction target in percent, when stated numerically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_year: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Goal {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            year: None,
            target: None,
            base_year: None,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A concrete action the company reports taking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initiative {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,

    /// Which scopes the initiative claims to address, free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Initiative {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            year: None,
            scope: None,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
