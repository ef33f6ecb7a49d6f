//! Typed errors for every collaborator seam in the pipeline.
//!
//! Each external call site returns one of these and the caller decides the
//! fallback explicitly; none of them escapes `Assistant::handle`.

use thiserror::Error;

/// Failures on the retrieval path.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The keyword index has not been built (or was cleared).
    #[error("keyword index unavailable")]
    IndexUnavailable,

    /// The external semantic search service failed.
    #[error("semantic search failed: {0}")]
    Semantic(String),
}

/// Failures from the generation service.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Rate limiting, server errors, timeouts, dropped connections.
    #[error("transient generation failure: {0}")]
    Transient(String),

    /// Malformed request or response, rejected credentials.
    #[error("generation failed: {0}")]
    Permanent(String),

    #[error("generation provider is disabled")]
    Disabled,
}

impl GenerationError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Transient(_))
    }
}

/// Failures from the durable key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to load namespace '{namespace}': {reason}")]
    Load { namespace: String, reason: String },

    #[error("failed to save namespace '{namespace}': {reason}")]
    Save { namespace: String, reason: String },

    #[error("failed to decode stored value: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Internal analyzer failures; always converted into a degraded analysis.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("query contains no word characters: {0:?}")]
    NoTerms(String),
}

/// Invalid tuning values or vocabulary patterns.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("weights must be non-negative with a positive sum (semantic={semantic}, keyword={keyword})")]
    InvalidWeights { semantic: f64, keyword: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GenerationError::Transient("429".into()).is_transient());
        assert!(!GenerationError::Permanent("400".into()).is_transient());
        assert!(!GenerationError::Disabled.is_transient());
    }

    #[test]
    fn test_messages_name_the_namespace() {
        let err = StoreError::Save {
            namespace: "cache_exact".into(),
            reason: "disk full".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to save namespace 'cache_exact': disk full"
        );
    }
}
