//! Semantic search providers.
//!
//! - **[`DisabledSemanticSearch`]**: returns no hits, so hybrid retrieval
//!   runs on the keyword channel alone.
//! - **[`HttpSemanticSearch`]**: `POST {url}/search` with `{query, k}`,
//!   expecting `{results: [{content, metadata, similarity}]}`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use handbook_assistant_core::error::RetrievalError;
use handbook_assistant_core::semantic::{SemanticHit, SemanticSearch};
use serde::Deserialize;
use std::time::Duration;

use crate::config::SemanticConfig;

// ============ Disabled Provider ============

pub struct DisabledSemanticSearch;

#[async_trait]
impl SemanticSearch for DisabledSemanticSearch {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SemanticHit>, RetrievalError> {
        Ok(Vec::new())
    }
}

// ============ HTTP Provider ============

/// Nearest-neighbour search over an external vector index service.
pub struct HttpSemanticSearch {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SemanticHit>,
}

impl HttpSemanticSearch {
    pub fn new(config: &SemanticConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("semantic.url required for http provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl SemanticSearch for HttpSemanticSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SemanticHit>, RetrievalError> {
        let endpoint = format!("{}/search", self.url.trim_end_matches('/'));
        let response = self
            .client
            .post(endpoint)
            .json(&serde_json::json!({ "query": query, "k": k }))
            .send()
            .await
            .map_err(|e| RetrievalError::Semantic(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Semantic(format!(
                "search service error {}: {}",
                status, body_text
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Semantic(format!("invalid search response: {}", e)))?;

        let mut hits = body.results;
        hits.truncate(k);
        Ok(hits)
    }
}

/// Create the configured [`SemanticSearch`] provider.
pub fn create_semantic(config: &SemanticConfig) -> Result<Box<dyn SemanticSearch>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledSemanticSearch)),
        "http" => Ok(Box::new(HttpSemanticSearch::new(config)?)),
        other => bail!("Unknown semantic provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape() {
        let body: SearchResponse = serde_json::from_str(
            r#"{"results": [{"content": "c", "metadata": {"title": "T", "url": "u"}, "similarity": 0.7}]}"#,
        )
        .unwrap();
        assert_eq!(body.results.len(), 1);
        assert_eq!(body.results[0].source().title, "T");

        let empty: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.results.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_returns_nothing() {
        let search = create_semantic(&SemanticConfig::default()).unwrap();
        assert!(search.search("anything", 5).await.unwrap().is_empty());
    }

    #[test]
    fn test_http_requires_url() {
        let config = SemanticConfig {
            provider: "http".into(),
            url: None,
            timeout_secs: 5,
        };
        assert!(create_semantic(&config).is_err());
    }
}
