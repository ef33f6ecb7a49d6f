//! TF-IDF keyword index with cosine scoring.
//!
//! # Scoring
//!
//! - `tf(t, d) = count(t, d) / |d|`
//! - `idf(t) = ln(N / (df(t) + 1))`
//! - each chunk stores a sparse `tf · idf` vector
//! - a query is vectorized against the same IDF table and compared to every
//!   chunk by cosine similarity; non-positive scores are dropped
//!
//! Search is a linear scan over the corpus. The index is rebuilt wholesale
//! when the corpus changes; there is no incremental update.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::DocumentChunk;

const MIN_TERM_CHARS: usize = 2;
const MAX_TERM_CHARS: usize = 50;

/// Sparse term → weight mapping.
pub type TermVector = HashMap<String, f64>;

/// Split text into index terms.
///
/// Lowercases, replaces every character that is not a word character,
/// whitespace, or `-` with a space, and keeps tokens of 2–50 characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| (MIN_TERM_CHARS..=MAX_TERM_CHARS).contains(&t.chars().count()))
        .map(str::to_string)
        .collect()
}

/// A chunk matched by [`KeywordIndex::search`].
#[derive(Debug, Clone, Copy)]
pub struct KeywordHit<'a> {
    pub chunk: &'a DocumentChunk,
    /// Position of the chunk in the corpus.
    pub position: usize,
    pub score: f64,
}

/// In-memory TF-IDF index over a fixed corpus.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    chunks: Vec<DocumentChunk>,
    idf: HashMap<String, f64>,
    vectors: Vec<TermVector>,
}

impl KeywordIndex {
    pub fn build(chunks: Vec<DocumentChunk>) -> Self {
        let docs: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.content)).collect();

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for terms in &docs {
            let unique: HashSet<&str> = terms.iter().map(String::as_str).collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let total = chunks.len() as f64;
        let idf: HashMap<String, f64> = doc_freq
            .into_iter()
            .map(|(term, df)| (term.to_string(), (total / (df as f64 + 1.0)).ln()))
            .collect();

        let vectors = docs.iter().map(|terms| weigh(terms, &idf)).collect();

        debug!(chunks = chunks.len(), terms = idf.len(), "built keyword index");

        Self {
            chunks,
            idf,
            vectors,
        }
    }

    /// Top `k` chunks by descending cosine score. Equal scores keep corpus order.
    pub fn search(&self, query: &str, k: usize) -> Vec<KeywordHit<'_>> {
        if self.idf.is_empty() || k == 0 {
            return Vec::new();
        }

        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let query_vec = weigh(&terms, &self.idf);

        let mut scored: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine(&query_vec, v)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(position, score)| KeywordHit {
                chunk: &self.chunks[position],
                position,
                score,
            })
            .collect()
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    /// Number of distinct terms.
    pub fn vocabulary_len(&self) -> usize {
        self.idf.len()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn weigh(terms: &[String], idf: &HashMap<String, f64>) -> TermVector {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for term in terms {
        *counts.entry(term.as_str()).or_insert(0) += 1;
    }
    let total = terms.len() as f64;
    counts
        .into_iter()
        .map(|(term, count)| {
            let tf = count as f64 / total;
            let weight = tf * idf.get(term).copied().unwrap_or(0.0);
            (term.to_string(), weight)
        })
        .collect()
}

fn cosine(a: &TermVector, b: &TermVector) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, wa)| b.get(term).map(|wb| wa * wb))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }
    let norm_a = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b = b.values().map(|w| w * w).sum::<f64>().sqrt();
    let denom = norm_a * norm_b;
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> DocumentChunk {
        DocumentChunk {
            url: format!("https://handbook.example/{}", content.len()),
            title: content.split_whitespace().next().unwrap_or("").to_string(),
            content: content.to_string(),
            headings: Vec::new(),
            word_count: content.split_whitespace().count(),
            chunk_index: 0,
            total_chunks: 1,
        }
    }

    fn corpus() -> Vec<DocumentChunk> {
        vec![
            chunk("gitlab pipelines run jobs in stages"),
            chunk("the handbook describes remote work"),
            chunk("merge requests need review and approval"),
            chunk("stages of a pipeline include build and test"),
        ]
    }

    #[test]
    fn test_tokenize_strips_punctuation_and_short_terms() {
        assert_eq!(
            tokenize("Merge-Request's CI/CD!"),
            vec!["merge-request", "ci", "cd"]
        );
    }

    #[test]
    fn test_tokenize_drops_overlong_terms() {
        let long = "x".repeat(51);
        assert_eq!(tokenize(&format!("ok {}", long)), vec!["ok"]);
    }

    #[test]
    fn test_best_match_ranks_first() {
        let index = KeywordIndex::build(corpus());
        let hits = index.search("pipeline stages", 10);
        assert_eq!(hits[0].position, 3);
        assert!(hits.iter().any(|h| h.position == 0));
        assert!(hits.iter().all(|h| h.position != 1 && h.position != 2));
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_ties_keep_corpus_order() {
        let index = KeywordIndex::build(vec![
            chunk("rust cargo"),
            chunk("rust cargo"),
            chunk("python pip"),
            chunk("java maven"),
        ]);
        let hits = index.search("cargo", 10);
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 1]);
        assert!((hits[0].score - hits[1].score).abs() < 1e-12);
    }

    #[test]
    fn test_top_k_truncates() {
        let index = KeywordIndex::build(corpus());
        assert_eq!(index.search("pipeline stages", 1).len(), 1);
        assert!(index.search("pipeline stages", 0).is_empty());
    }

    #[test]
    fn test_empty_vocabulary_returns_nothing() {
        let index = KeywordIndex::build(vec![chunk("! ? ."), chunk("a b c")]);
        assert_eq!(index.vocabulary_len(), 0);
        assert!(index.search("anything at all", 5).is_empty());
    }

    #[test]
    fn test_empty_corpus_returns_nothing() {
        let index = KeywordIndex::build(Vec::new());
        assert!(index.is_empty());
        assert!(index.search("pipeline", 5).is_empty());
    }

    #[test]
    fn test_unknown_terms_score_nothing() {
        let index = KeywordIndex::build(corpus());
        assert!(index.search("kubernetes helm", 5).is_empty());
    }
}
