//! Hybrid retrieval: keyword and semantic fusion with rule-based rerank.
//!
//! The retriever owns the keyword index and borrows a [`SemanticSearch`]
//! collaborator. Retrieval never fails outward: every error on the hybrid
//! path falls back to semantic-only search, and a failing semantic channel
//! yields an empty result list.
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Analyze the query ([`QueryAnalyzer`]).
//! 2. Fetch `2 × top_k` candidates from the keyword index and from the
//!    semantic collaborator.
//! 3. Fuse by content identity (first 100 characters). A chunk seen in
//!    both channels keeps the maximum score per channel.
//! 4. `combined = semantic_weight × semantic + keyword_weight × keyword`.
//! 5. Rerank: `combined *= 1 + Σ boosts` for matched keywords, entities,
//!    and definition/process markers.
//! 6. Stable sort by combined score (desc), truncate to `top_k`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analyzer::QueryAnalyzer;
use crate::domain::DomainVocabulary;
use crate::error::{ConfigError, RetrievalError};
use crate::keyword::KeywordIndex;
use crate::models::{DocumentChunk, QueryAnalysis, QueryType, SearchResult, SourceRef};
use crate::semantic::SemanticSearch;

/// Characters of content used as a chunk's identity during fusion.
const IDENTITY_CHARS: usize = 100;

/// Retrieval tuning, decoupled from application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub semantic_weight: f64,
    pub keyword_weight: f64,
    pub top_k: usize,
    pub use_hybrid: bool,
    pub boosts: RerankBoosts,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            top_k: 3,
            use_hybrid: true,
            boosts: RerankBoosts::default(),
        }
    }
}

/// Increments added to the rerank multiplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankBoosts {
    /// Per analyzer keyword found in the content.
    pub keyword: f64,
    /// Per domain entity found in the content.
    pub entity: f64,
    pub definition: f64,
    pub process: f64,
}

impl Default for RerankBoosts {
    fn default() -> Self {
        Self {
            keyword: 0.1,
            entity: 0.15,
            definition: 0.2,
            process: 0.2,
        }
    }
}

/// Channel weights; always non-negative and summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetrievalWeights {
    pub semantic: f64,
    pub keyword: f64,
}

impl RetrievalWeights {
    /// Renormalize `(semantic, keyword)` to sum to 1.
    pub fn normalized(semantic: f64, keyword: f64) -> Result<Self, ConfigError> {
        let total = semantic + keyword;
        if semantic < 0.0 || keyword < 0.0 || !(total > 0.0) {
            return Err(ConfigError::InvalidWeights { semantic, keyword });
        }
        Ok(Self {
            semantic: semantic / total,
            keyword: keyword / total,
        })
    }
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            keyword: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrieverStats {
    pub total_searches: u64,
    pub hybrid_searches: u64,
    pub semantic_searches: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchMode {
    Hybrid,
    SemanticOnly,
}

/// One candidate from a single channel, before fusion.
#[derive(Debug, Clone)]
struct ChannelHit {
    content: String,
    source: SourceRef,
    score: f64,
}

#[derive(Debug, Clone)]
struct Markers {
    definition: Vec<String>,
    process: Vec<String>,
}

pub struct HybridRetriever {
    analyzer: QueryAnalyzer,
    semantic: Arc<dyn SemanticSearch>,
    index: RwLock<Option<KeywordIndex>>,
    weights: RwLock<RetrievalWeights>,
    boosts: RerankBoosts,
    markers: Markers,
    stats: Mutex<RetrieverStats>,
}

impl HybridRetriever {
    /// Create a retriever with no keyword index; call
    /// [`rebuild_index`](Self::rebuild_index) before hybrid search.
    pub fn new(
        vocab: &DomainVocabulary,
        config: &RetrievalConfig,
        semantic: Arc<dyn SemanticSearch>,
    ) -> Result<Self, ConfigError> {
        let lower = |items: &[String]| -> Vec<String> {
            items.iter().map(|s| s.to_lowercase()).collect()
        };
        Ok(Self {
            analyzer: QueryAnalyzer::from_vocabulary(vocab)?,
            semantic,
            index: RwLock::new(None),
            weights: RwLock::new(RetrievalWeights::normalized(
                config.semantic_weight,
                config.keyword_weight,
            )?),
            boosts: config.boosts.clone(),
            markers: Markers {
                definition: lower(&vocab.definition_markers),
                process: lower(&vocab.process_markers),
            },
            stats: Mutex::new(RetrieverStats::default()),
        })
    }

    /// Replace the keyword index wholesale.
    pub fn rebuild_index(&self, chunks: Vec<DocumentChunk>) {
        let index = KeywordIndex::build(chunks);
        info!(
            chunks = index.len(),
            terms = index.vocabulary_len(),
            "keyword index rebuilt"
        );
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = Some(index);
    }

    /// Number of chunks in the keyword index, if one is built.
    pub fn indexed_chunks(&self) -> Option<usize> {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(KeywordIndex::len)
    }

    pub fn analyzer(&self) -> &QueryAnalyzer {
        &self.analyzer
    }

    pub fn weights(&self) -> RetrievalWeights {
        *self.weights.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Set new channel weights, renormalized to sum to 1.
    pub fn tune_weights(&self, semantic: f64, keyword: f64) -> Result<RetrievalWeights, ConfigError> {
        let weights = RetrievalWeights::normalized(semantic, keyword)?;
        *self.weights.write().unwrap_or_else(|e| e.into_inner()) = weights;
        info!(semantic = weights.semantic, keyword = weights.keyword, "retrieval weights tuned");
        Ok(weights)
    }

    pub fn stats(&self) -> RetrieverStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Ranked passages for `query`. Never fails; see the module docs for
    /// the fallback order.
    pub async fn search(&self, query: &str, top_k: usize, use_hybrid: bool) -> Vec<SearchResult> {
        let started = Instant::now();
        let analysis = self.analyzer.analyze(query);

        let (results, mode) = if use_hybrid {
            match self.hybrid(query, &analysis, top_k).await {
                Ok(results) => (results, SearchMode::Hybrid),
                Err(e) => {
                    warn!(error = %e, "hybrid retrieval failed, falling back to semantic-only");
                    (self.semantic_only(query, top_k).await, SearchMode::SemanticOnly)
                }
            }
        } else {
            (self.semantic_only(query, top_k).await, SearchMode::SemanticOnly)
        };

        self.record(mode, started.elapsed());
        debug!(results = results.len(), mode = ?mode, "retrieval finished");
        results
    }

    async fn hybrid(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let fetch = top_k.saturating_mul(2);

        let keyword_hits: Vec<ChannelHit> = {
            let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
            let index = guard.as_ref().ok_or(RetrievalError::IndexUnavailable)?;
            index
                .search(query, fetch)
                .into_iter()
                .map(|hit| ChannelHit {
                    content: hit.chunk.content.clone(),
                    source: hit.chunk.source(),
                    score: hit.score,
                })
                .collect()
        };

        let semantic_hits: Vec<ChannelHit> = self
            .semantic
            .search(query, fetch)
            .await?
            .into_iter()
            .map(|hit| ChannelHit {
                source: hit.source(),
                content: hit.content,
                score: hit.similarity,
            })
            .collect();

        debug!(
            keyword = keyword_hits.len(),
            semantic = semantic_hits.len(),
            "retrieval candidates"
        );

        let mut results = fuse(semantic_hits, keyword_hits, self.weights());
        rerank(&mut results, analysis, &self.boosts, &self.markers);
        sort_descending(&mut results);
        results.truncate(top_k);
        Ok(results)
    }

    async fn semantic_only(&self, query: &str, top_k: usize) -> Vec<SearchResult> {
        match self.semantic.search(query, top_k).await {
            Ok(hits) => {
                let mut results: Vec<SearchResult> = hits
                    .into_iter()
                    .map(|hit| SearchResult {
                        source: hit.source(),
                        content: hit.content,
                        keyword_score: 0.0,
                        semantic_score: hit.similarity,
                        combined_score: hit.similarity,
                    })
                    .collect();
                sort_descending(&mut results);
                results.truncate(top_k);
                results
            }
            Err(e) => {
                warn!(error = %e, "semantic-only retrieval failed, returning no passages");
                Vec::new()
            }
        }
    }

    fn record(&self, mode: SearchMode, elapsed: Duration) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.total_searches += 1;
        match mode {
            SearchMode::Hybrid => stats.hybrid_searches += 1,
            SearchMode::SemanticOnly => stats.semantic_searches += 1,
        }
        let n = stats.total_searches as f64;
        let latency_ms = elapsed.as_secs_f64() * 1000.0;
        stats.avg_latency_ms = (stats.avg_latency_ms * (n - 1.0) + latency_ms) / n;
    }
}

fn identity(content: &str) -> String {
    content.chars().take(IDENTITY_CHARS).collect()
}

/// Merge both channels by content identity, semantic first.
fn fuse(
    semantic: Vec<ChannelHit>,
    keyword: Vec<ChannelHit>,
    weights: RetrievalWeights,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    let mut merge = |hit: ChannelHit, is_semantic: bool| {
        let key = identity(&hit.content);
        let position = match positions.get(&key) {
            Some(&i) => i,
            None => {
                positions.insert(key, results.len());
                results.push(SearchResult {
                    content: hit.content,
                    source: hit.source,
                    keyword_score: 0.0,
                    semantic_score: 0.0,
                    combined_score: 0.0,
                });
                results.len() - 1
            }
        };
        let entry = &mut results[position];
        if is_semantic {
            entry.semantic_score = entry.semantic_score.max(hit.score);
        } else {
            entry.keyword_score = entry.keyword_score.max(hit.score);
        }
    };

    for hit in semantic {
        merge(hit, true);
    }
    for hit in keyword {
        merge(hit, false);
    }

    for r in &mut results {
        r.combined_score = weights.semantic * r.semantic_score + weights.keyword * r.keyword_score;
    }
    results
}

fn rerank(
    results: &mut [SearchResult],
    analysis: &QueryAnalysis,
    boosts: &RerankBoosts,
    markers: &Markers,
) {
    for r in results.iter_mut() {
        let content = r.content.to_lowercase();
        let has_any = |needles: &[String]| needles.iter().any(|m| content.contains(m.as_str()));

        let mut boost = 1.0;
        boost += boosts.keyword
            * analysis
                .keywords
                .iter()
                .filter(|k| content.contains(k.as_str()))
                .count() as f64;
        boost += boosts.entity
            * analysis
                .entities
                .iter()
                .filter(|e| content.contains(e.as_str()))
                .count() as f64;
        match analysis.query_type {
            QueryType::Definition if has_any(&markers.definition) => boost += boosts.definition,
            QueryType::Process if has_any(&markers.process) => boost += boosts.process,
            _ => {}
        }

        r.combined_score *= boost;
    }
}

fn sort_descending(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
