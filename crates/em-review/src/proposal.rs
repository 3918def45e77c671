// proposal.rs — The unit of work the review gate decides on.
//
// A proposal is one pending write: the slice of company data currently
// stored (`before`) and the slice a pipeline stage wants to store
// (`after`), plus enough context to title a reviewer prompt. The gate
// never sees payloads or jobs, only proposals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A proposed write awaiting a gate decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub proposal_id: Uuid,

    /// Company identifier the write targets.
    pub company: String,

    /// Display name for reviewer prompts.
    pub company_name: String,

    /// Which aspect of the company is being written, e.g. "emissions",
    /// "economy", "goals".
    pub endpoint: String,

    /// The stored slice this write would replace. `Null` or an empty
    /// object/array means nothing is stored yet.
    pub before: Value,

    /// The slice the stage wants to store.
    pub after: Value,

    pub created_at: DateTime<Utc>,

    /// SHA-256 over the serialized `after` slice, for integrity checks
    /// when a proposal round-trips through the pending registry.
    pub content_hash: String,
}

impl Proposal {
    /// Create a proposal with its content hash computed.
    pub fn new(
        company: impl Into<String>,
        company_name: impl Into<String>,
        endpoint: impl Into<String>,
        before: Value,
        after: Value,
    ) -> Self {
        let content_hash = compute_content_hash(&after);
        Self {
            proposal_id: Uuid::new_v4(),
            company: company.into(),
            company_name: company_name.into(),
            endpoint: endpoint.into(),
            before,
            after,
            created_at: Utc::now(),
            content_hash,
        }
    }

    /// True when nothing is stored yet for this slice. First writes
    /// bypass review entirely.
    pub fn is_first_write(&self) -> bool {
        match &self.before {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Verify the content hash still matches the `after` slice.
    pub fn verify_hash(&self) -> bool {
        self.content_hash == compute_content_hash(&self.after)
    }
}

/// SHA-256 hex digest of a serialized JSON value.
fn compute_content_hash(value: &Value) -> String {
    let json = serde_json::to_string(value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn proposal_creation_computes_hash() {
        let p = Proposal::new(
            "Q123",
            "Acme AB",
            "emissions",
            Value::Null,
            json!({"scope1": {"total": 100.0}}),
        );
        assert!(!p.content_hash.is_empty());
        assert_eq!(p.content_hash.len(), 64); // SHA-256 hex length
    }

    #[test]
    fn hash_is_deterministic_over_after() {
        let after = json!({"scope1": {"total": 100.0}});
        let p1 = Proposal::new("Q123", "Acme AB", "emissions", Value::Null, after.clone());
        let p2 = Proposal::new("Q123", "Acme AB", "emissions", json!({"old": 1}), after);
        assert_eq!(p1.content_hash, p2.content_hash);
    }

    #[test]
    fn tampering_breaks_verification() {
        let mut p = Proposal::new(
            "Q123",
            "Acme AB",
            "emissions",
            Value::Null,
            json!({"scope1": {"total": 100.0}}),
        );
        assert!(p.verify_hash());
        p.after = json!({"scope1": {"total": 999.0}});
        assert!(!p.verify_hash());
    }

    #[test]
    fn null_and_empty_before_are_first_writes() {
        let after = json!({"x": 1});
        for before in [Value::Null, json!({}), json!([])] {
            let p = Proposal::new("Q1", "A", "economy", before, after.clone());
            assert!(p.is_first_write());
        }
    }

    #[test]
    fn populated_before_is_not_a_first_write() {
        let p = Proposal::new(
            "Q1",
            "A",
            "economy",
            json!({"turnover": {"value": 5.0}}),
            json!({"turnover": {"value": 6.0}}),
        );
        assert!(!p.is_first_write());
    }
}
