// metadata.rs — Provenance and verification for every reported value.
//
// Each value object (a scope total, a turnover figure, a goal) owns at most
// one Metadata record. Whether `verified_by` is set is the single trust
// signal in the system: the aggregation rules and the read model consult
// nothing else to decide whether a figure counts as human-checked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a value came from and who has vouched for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Free text or URL describing the source (usually the report URL).
    pub source: String,

    /// Optional note from the extraction stage or a reviewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Who submitted the value (an extraction identity, not a human).
    pub added_by: String,

    /// The reviewer who approved the value, if anyone has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,

    /// Last time this record changed.
    pub updated_at: DateTime<Utc>,
}

impl Metadata {
    /// New unverified metadata from an extraction run.
    pub fn new(source: impl Into<String>, added_by: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            comment: None,
            added_by: added_by.into(),
            verified_by: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// A value is trusted exactly when a reviewer has verified it.
    pub fn is_verified(&self) -> bool {
        self.verified_by.is_some()
    }

    /// Record the approving reviewer.
    pub fn verify(&mut self, reviewer: impl Into<String>) {
        self.verified_by = Some(reviewer.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metadata_is_unverified() {
        let meta = Metadata::new("https://example.com/report.pdf", "extractor");
        assert!(!meta.is_verified());
        assert!(meta.verified_by.is_none());
    }

    #[test]
    fn verify_records_reviewer() {
        let mut meta = Metadata::new("report.pdf", "extractor");
        meta.verify("alex");
        assert!(meta.is_verified());
        assert_eq!(meta.verified_by.as_deref(), Some("alex"));
    }

    #[test]
    fn absent_fields_omitted_from_json() {
        let meta = Metadata::new("report.pdf", "extractor");
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("comment"));
        assert!(!json.contains("verified_by"));
    }
}
