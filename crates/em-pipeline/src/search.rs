// search.rs — The vector-search seam for report passages.
//
// The pipeline never talks to a vector index directly; the ingest stage
// goes through this trait, so tests and the default daemon run on fixed
// passages while production wires in a real index client.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from passage retrieval.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The search backend could not be reached or failed outright.
    #[error("search backend unavailable: {0}")]
    Unavailable(String),
}

/// Ranked-passage retrieval over indexed report documents.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    /// Up to `limit` passages from `collection` whose source document is
    /// `source_url`, ranked against `query_texts`.
    async fn query(
        &self,
        collection: &str,
        source_url: &str,
        query_texts: &[&str],
        limit: usize,
    ) -> Result<Vec<String>, SearchError>;
}

/// Fixed passages regardless of the query. The reference implementation
/// for tests and dry runs; an empty passage list models a report the
/// index holds nothing relevant for.
pub struct StaticSearch {
    passages: Vec<String>,
}

impl StaticSearch {
    pub fn new(passages: Vec<String>) -> Self {
        Self { passages }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl DocumentSearch for StaticSearch {
    async fn query(
        &self,
        _collection: &str,
        _source_url: &str,
        _query_texts: &[&str],
        limit: usize,
    ) -> Result<Vec<String>, SearchError> {
        Ok(self.passages.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_search_honors_the_limit() {
        let search = StaticSearch::new(vec!["a".into(), "b".into(), "c".into()]);
        let found = search
            .query("emission_reports", "https://x", &["q"], 2)
            .await
            .unwrap();
        assert_eq!(found, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn empty_search_finds_nothing() {
        let search = StaticSearch::empty();
        let found = search
            .query("emission_reports", "https://x", &["q"], 5)
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
