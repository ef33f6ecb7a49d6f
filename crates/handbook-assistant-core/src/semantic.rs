//! Semantic (embedding-based) search collaborator.
//!
//! The embedding model and vector index live outside the core. The hybrid
//! retriever only needs nearest neighbours for a query string, with a
//! higher-is-better similarity in `[0, 1]`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;
use crate::models::SourceRef;

/// One nearest-neighbour result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticHit {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub similarity: f64,
}

impl SemanticHit {
    pub fn source(&self) -> SourceRef {
        SourceRef::from_metadata(&self.metadata)
    }
}

#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Up to `k` hits for `query`, best first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SemanticHit>, RetrievalError>;
}
