//! Core data models shared across the pipeline.
//!
//! These types cross the boundary between the core and the application
//! crate: corpus chunks loaded from disk, ranked search results, and the
//! token/cost accounting returned with every answer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A heading captured from the source page a chunk was cut from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Heading {
    /// Heading tag, e.g. `"h2"`.
    pub level: String,
    pub text: String,
}

/// A bounded slice of a source document, the unit of retrieval.
///
/// Produced by an external ingestion step and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub url: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub headings: Vec<Heading>,
    #[serde(default)]
    pub word_count: usize,
    /// Position of this chunk within its document.
    #[serde(default, alias = "chunk_id")]
    pub chunk_index: usize,
    #[serde(default = "default_total_chunks")]
    pub total_chunks: usize,
}

fn default_total_chunks() -> usize {
    1
}

impl DocumentChunk {
    /// Citation for this chunk.
    pub fn source(&self) -> SourceRef {
        SourceRef {
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }
}

/// A citable source attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

impl SourceRef {
    /// Build a citation from loosely-typed metadata (as returned by the
    /// semantic search service), falling back to placeholder values.
    pub fn from_metadata(metadata: &serde_json::Map<String, serde_json::Value>) -> Self {
        let field = |name: &str, fallback: &str| {
            metadata
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or(fallback)
                .to_string()
        };
        Self {
            title: field("title", "Unknown Document"),
            url: field("url", "#"),
        }
    }
}

/// A ranked passage produced by the hybrid retriever.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResult {
    pub content: String,
    pub source: SourceRef,
    /// Raw TF-IDF cosine score (0.0 if the keyword channel missed it).
    pub keyword_score: f64,
    /// Raw similarity from the semantic service (0.0 if it missed it).
    pub semantic_score: f64,
    /// Weighted fusion score after rerank boosts.
    pub combined_score: f64,
}

/// Query intent classes recognized by the analyzer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    #[default]
    Factual,
    Definition,
    Process,
    Comparison,
    List,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryType::Factual => "factual",
            QueryType::Definition => "definition",
            QueryType::Process => "process",
            QueryType::Comparison => "comparison",
            QueryType::List => "list",
        };
        f.write_str(name)
    }
}

/// Per-request analysis of a user query. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryAnalysis {
    pub original_query: String,
    pub cleaned_query: String,
    pub keywords: Vec<String>,
    pub entities: Vec<String>,
    pub query_type: QueryType,
    pub needs_expansion: bool,
    pub expansions: Vec<String>,
}

/// Token and cost accounting for one answer.
///
/// All fields are zero for answers that made no generation call
/// (cache hits, templates, redirects, validation errors, apologies).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct TokenInfo {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

impl TokenInfo {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.total_tokens == 0
            && self.cost_usd == 0.0
    }
}
