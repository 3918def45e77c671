// industry.rs — GICS industry classification, zero-or-one per company.

use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Industry {
    /// Eight-digit GICS sub-industry code.
    pub sub_industry_code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Industry {
    pub fn new(sub_industry_code: impl Into<String>) -> Self {
        Self {
            sub_industry_code: sub_industry_code.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
