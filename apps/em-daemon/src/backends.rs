// backends.rs — HTTP adapters for the out-of-process collaborators.
//
// The pipeline crates define the seams (CompletionBackend,
// DocumentSearch); this file binds them to plain JSON-over-HTTP
// services. The wire contracts are deliberately minimal — any service
// that accepts these bodies satisfies them:
//
//   POST {completion}/complete  {"instruction": ..., "input": ...}
//     -> {"text": "..."}
//   POST {search}/query  {"collection": ..., "source_url": ...,
//                         "queries": [...], "limit": N}
//     -> {"passages": ["...", ...]}

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use em_pipeline::{DocumentSearch, SearchError};
use em_review::{CompletionBackend, CompletionError};

use crate::config::{CompletionConfig, SearchConfig};

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

fn client() -> Result<Client, reqwest::Error> {
    Client::builder().timeout(REQUEST_TIMEOUT).build()
}

/// [`CompletionBackend`] over a text-generation HTTP service.
pub struct HttpCompletion {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct CompletionReply {
    text: String,
}

impl HttpCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        Ok(Self {
            client: client().map_err(|e| CompletionError::Unavailable(e.to_string()))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletion {
    async fn complete(&self, instruction: &str, input: &str) -> Result<String, CompletionError> {
        let mut request = self
            .client
            .post(format!("{}/complete", self.base_url))
            .json(&json!({ "instruction": instruction, "input": input }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CompletionError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CompletionError::Unavailable(format!(
                "completion service answered {}",
                response.status()
            )));
        }
        let reply: CompletionReply = response
            .json()
            .await
            .map_err(|e| CompletionError::Unusable(e.to_string()))?;
        Ok(reply.text)
    }
}

/// [`DocumentSearch`] over a vector-index HTTP service.
pub struct HttpSearch {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SearchReply {
    passages: Vec<String>,
}

impl HttpSearch {
    pub fn new(config: &SearchConfig) -> Result<Option<Self>, SearchError> {
        let Some(base_url) = &config.base_url else {
            return Ok(None);
        };
        Ok(Some(Self {
            client: client().map_err(|e| SearchError::Unavailable(e.to_string()))?,
            base_url: base_url.trim_end_matches('/').to_string(),
        }))
    }
}

#[async_trait]
impl DocumentSearch for HttpSearch {
    async fn query(
        &self,
        collection: &str,
        source_url: &str,
        query_texts: &[&str],
        limit: usize,
    ) -> Result<Vec<String>, SearchError> {
        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .json(&json!({
                "collection": collection,
                "source_url": source_url,
                "queries": query_texts,
                "limit": limit,
            }))
            .send()
            .await
            .map_err(|e| SearchError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SearchError::Unavailable(format!(
                "search service answered {}",
                response.status()
            )));
        }
        let reply: SearchReply = response
            .json()
            .await
            .map_err(|e| SearchError::Unavailable(e.to_string()))?;
        Ok(reply.passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_without_a_base_url_is_absent() {
        let search = HttpSearch::new(&SearchConfig { base_url: None }).unwrap();
        assert!(search.is_none());
    }

    #[test]
    fn base_urls_are_normalized() {
        let completion = HttpCompletion::new(&CompletionConfig {
            base_url: "http://completion:9000/".to_string(),
            token: None,
        })
        .unwrap();
        assert_eq!(completion.base_url, "http://completion:9000");

        let search = HttpSearch::new(&SearchConfig {
            base_url: Some("http://index:6333///".to_string()),
        })
        .unwrap()
        .unwrap();
        assert_eq!(search.base_url, "http://index:6333");
    }

    #[test]
    fn reply_shapes_parse() {
        let reply: CompletionReply = serde_json::from_str(r#"{"text": "Acme Corp"}"#).unwrap();
        assert_eq!(reply.text, "Acme Corp");

        let reply: SearchReply =
            serde_json::from_str(r#"{"passages": ["scope 1: 100 tCO2e"]}"#).unwrap();
        assert_eq!(reply.passages.len(), 1);
    }
}
