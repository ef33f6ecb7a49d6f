//! Two-tier response cache.
//!
//! | Tier | Key | Default TTL | Default capacity |
//! |------|-----|-------------|------------------|
//! | exact | lowercased, whitespace-normalized query | 12 h | 500 |
//! | fuzzy | SHA-256 of the exact key with filler phrases removed | 24 h | 1000 |
//!
//! # Lookup order
//!
//! 1. exact tier by key
//! 2. fuzzy tier by key
//! 3. fuzzy tier similarity scan: every live entry, oldest first, compared
//!    with [`QuerySimilarity::score`]; the first at or above the threshold
//!    wins
//!
//! An entry is live while `now - stored_at < ttl`. Expired entries are
//! misses but stay in place until evicted; eviction happens only on the
//! write path, oldest `stored_at` first, once a tier exceeds its capacity.
//!
//! Every store writes both tiers and persists each tier in full through the
//! [`KvStore`]. Writes to a tier are serialized by that tier's mutex, which
//! is held across eviction and persistence. Persistence failures are logged
//! and never surface to the caller; a tier that fails to load starts empty.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::domain::DomainVocabulary;
use crate::error::ConfigError;
use crate::models::SourceRef;
use crate::store::{KvStore, Namespace};

pub const EXACT_NAMESPACE: &str = "cache_exact";
pub const FUZZY_NAMESPACE: &str = "cache_fuzzy";

/// Score returned when one normalized query contains the other.
const SUBSTRING_SIMILARITY: f64 = 0.9;
/// Added when both queries share a domain term.
const DOMAIN_TERM_BOOST: f64 = 0.2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub exact_ttl_secs: i64,
    pub fuzzy_ttl_secs: i64,
    pub exact_capacity: usize,
    pub fuzzy_capacity: usize,
    pub similarity_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            exact_ttl_secs: 43_200,
            fuzzy_ttl_secs: 86_400,
            exact_capacity: 500,
            fuzzy_capacity: 1000,
            similarity_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Normalized query text, compared by the similarity scan.
    pub query: String,
    pub response: String,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Fuzzy,
    FuzzySimilar,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchKind::Exact => "exact",
            MatchKind::Fuzzy => "fuzzy",
            MatchKind::FuzzySimilar => "fuzzy_similar",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub metadata: serde_json::Value,
    pub kind: MatchKind,
}

impl CacheHit {
    fn from_entry(entry: &CacheEntry, kind: MatchKind) -> Self {
        Self {
            response: entry.response.clone(),
            sources: entry.sources.clone(),
            metadata: entry.metadata.clone(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub exact_entries: usize,
    pub fuzzy_entries: usize,
    pub exact_hits: u64,
    pub fuzzy_hits: u64,
    pub similar_hits: u64,
    pub misses: u64,
}

/// Normalize a query for the exact tier: lowercase, collapse whitespace, trim.
pub fn exact_key(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cheap set-overlap similarity between two queries.
#[derive(Debug, Clone)]
pub struct QuerySimilarity {
    stop_words: HashSet<String>,
    domain_terms: HashSet<String>,
}

impl QuerySimilarity {
    pub fn from_vocabulary(vocab: &DomainVocabulary) -> Self {
        let lower = |items: &[String]| -> HashSet<String> {
            items.iter().map(|s| s.to_lowercase()).collect()
        };
        Self {
            stop_words: lower(&vocab.cache.stop_words),
            domain_terms: lower(&vocab.cache.domain_terms),
        }
    }

    /// Similarity in `[0, 1]`, symmetric in its arguments.
    ///
    /// Punctuation is stripped and case folded. Containment scores 0.9;
    /// otherwise the Jaccard index of the stop-word-filtered word sets,
    /// plus 0.2 when a domain term appears in both, capped at 1.0.
    pub fn score(&self, a: &str, b: &str) -> f64 {
        let a = strip_punctuation(a);
        let b = strip_punctuation(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a.contains(b.as_str()) || b.contains(a.as_str()) {
            return SUBSTRING_SIMILARITY;
        }

        let words_a = self.content_words(&a);
        let words_b = self.content_words(&b);
        if words_a.is_empty() || words_b.is_empty() {
            return 0.0;
        }

        let shared = words_a.intersection(&words_b).count();
        let union = words_a.union(&words_b).count();
        let mut score = shared as f64 / union as f64;

        if words_a
            .intersection(&words_b)
            .any(|w| self.domain_terms.contains(*w))
        {
            score += DOMAIN_TERM_BOOST;
        }
        score.min(1.0)
    }

    fn content_words<'a>(&self, text: &'a str) -> HashSet<&'a str> {
        text.split_whitespace()
            .filter(|w| !self.stop_words.contains(*w))
            .collect()
    }
}

fn strip_punctuation(text: &str) -> String {
    let replaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct CacheTier {
    namespace: &'static str,
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CacheTier {
    async fn open(
        namespace: &'static str,
        ttl_secs: i64,
        capacity: usize,
        store: &dyn KvStore,
    ) -> Self {
        let entries = match store.load(namespace).await {
            Ok(raw) => decode_entries(namespace, raw),
            Err(e) => {
                error!(namespace, error = %e, "cache load failed; starting empty");
                HashMap::new()
            }
        };
        debug!(namespace, entries = entries.len(), "opened cache tier");
        Self {
            namespace,
            ttl: Duration::seconds(ttl_secs),
            capacity,
            entries: Mutex::new(entries),
        }
    }

    fn is_live(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.stored_at < self.ttl
    }

    async fn insert(&self, entry: CacheEntry, store: &dyn KvStore) {
        let mut entries = self.entries.lock().await;
        entries.insert(entry.key.clone(), entry);

        if entries.len() > self.capacity {
            let mut by_age: Vec<(DateTime<Utc>, String)> = entries
                .values()
                .map(|e| (e.stored_at, e.key.clone()))
                .collect();
            by_age.sort();
            let excess = entries.len() - self.capacity;
            for (_, key) in by_age.into_iter().take(excess) {
                entries.remove(&key);
            }
            debug!(namespace = self.namespace, evicted = excess, "evicted cache entries");
        }

        persist(self.namespace, &entries, store).await;
    }

    async fn clear(&self, store: &dyn KvStore) {
        let mut entries = self.entries.lock().await;
        entries.clear();
        persist(self.namespace, &entries, store).await;
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

fn decode_entries(namespace: &str, raw: Namespace) -> HashMap<String, CacheEntry> {
    raw.into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) => Some((key, entry)),
            Err(e) => {
                warn!(namespace, key = %key, error = %e, "skipping undecodable cache entry");
                None
            }
        })
        .collect()
}

async fn persist(namespace: &str, entries: &HashMap<String, CacheEntry>, store: &dyn KvStore) {
    let mut snapshot = Namespace::new();
    for (key, entry) in entries {
        match serde_json::to_value(entry) {
            Ok(value) => {
                snapshot.insert(key.clone(), value);
            }
            Err(e) => warn!(namespace, key = %key, error = %e, "skipping unencodable cache entry"),
        }
    }
    if let Err(e) = store.save(namespace, &snapshot).await {
        error!(namespace, error = %e, "cache save failed");
    }
}

#[derive(Debug, Default)]
struct Counters {
    exact_hits: u64,
    fuzzy_hits: u64,
    similar_hits: u64,
    misses: u64,
}

/// Exact and fuzzy cache tiers behind a single `lookup`/`store` interface.
pub struct CacheLayer {
    exact: CacheTier,
    fuzzy: CacheTier,
    store: Arc<dyn KvStore>,
    similarity: QuerySimilarity,
    filler: Option<Regex>,
    threshold: f64,
    counters: StdMutex<Counters>,
}

impl CacheLayer {
    /// Open both tiers, loading their contents from `store`.
    pub async fn open(
        store: Arc<dyn KvStore>,
        config: &CacheConfig,
        vocab: &DomainVocabulary,
    ) -> Result<Self, ConfigError> {
        let filler = filler_pattern(&vocab.cache.filler_phrases)?;
        let exact = CacheTier::open(
            EXACT_NAMESPACE,
            config.exact_ttl_secs,
            config.exact_capacity,
            store.as_ref(),
        )
        .await;
        let fuzzy = CacheTier::open(
            FUZZY_NAMESPACE,
            config.fuzzy_ttl_secs,
            config.fuzzy_capacity,
            store.as_ref(),
        )
        .await;

        Ok(Self {
            exact,
            fuzzy,
            store,
            similarity: QuerySimilarity::from_vocabulary(vocab),
            filler,
            threshold: config.similarity_threshold,
            counters: StdMutex::new(Counters::default()),
        })
    }

    /// Fuzzy-tier key: the exact key with filler phrases removed, hashed.
    pub fn fuzzy_key(&self, query: &str) -> String {
        let base = exact_key(query);
        let stripped = match &self.filler {
            Some(re) => re.replace_all(&base, "").into_owned(),
            None => base,
        };
        let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn lookup(&self, query: &str) -> Option<CacheHit> {
        self.lookup_at(query, Utc::now()).await
    }

    pub async fn lookup_at(&self, query: &str, now: DateTime<Utc>) -> Option<CacheHit> {
        let hit = self.find(query, now).await;
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        match hit.as_ref().map(|h| h.kind) {
            Some(MatchKind::Exact) => counters.exact_hits += 1,
            Some(MatchKind::Fuzzy) => counters.fuzzy_hits += 1,
            Some(MatchKind::FuzzySimilar) => counters.similar_hits += 1,
            None => counters.misses += 1,
        }
        hit
    }

    async fn find(&self, query: &str, now: DateTime<Utc>) -> Option<CacheHit> {
        let key = exact_key(query);
        {
            let entries = self.exact.entries.lock().await;
            if let Some(entry) = entries.get(&key) {
                if self.exact.is_live(entry, now) {
                    return Some(CacheHit::from_entry(entry, MatchKind::Exact));
                }
            }
        }

        let fuzzy_key = self.fuzzy_key(query);
        let entries = self.fuzzy.entries.lock().await;
        if let Some(entry) = entries.get(&fuzzy_key) {
            if self.fuzzy.is_live(entry, now) {
                return Some(CacheHit::from_entry(entry, MatchKind::Fuzzy));
            }
        }

        let mut live: Vec<&CacheEntry> = entries
            .values()
            .filter(|e| self.fuzzy.is_live(e, now))
            .collect();
        live.sort_by(|a, b| a.stored_at.cmp(&b.stored_at).then_with(|| a.key.cmp(&b.key)));

        live.into_iter()
            .find(|e| self.similarity.score(&key, &e.query) >= self.threshold)
            .map(|e| CacheHit::from_entry(e, MatchKind::FuzzySimilar))
    }

    pub async fn store(
        &self,
        query: &str,
        response: &str,
        sources: &[SourceRef],
        metadata: serde_json::Value,
    ) {
        self.store_at(query, response, sources, metadata, Utc::now())
            .await;
    }

    pub async fn store_at(
        &self,
        query: &str,
        response: &str,
        sources: &[SourceRef],
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        let normalized = exact_key(query);
        let exact_entry = CacheEntry {
            key: normalized.clone(),
            query: normalized.clone(),
            response: response.to_string(),
            sources: sources.to_vec(),
            metadata,
            stored_at: now,
        };
        let fuzzy_entry = CacheEntry {
            key: self.fuzzy_key(query),
            ..exact_entry.clone()
        };

        self.exact.insert(exact_entry, self.store.as_ref()).await;
        self.fuzzy.insert(fuzzy_entry, self.store.as_ref()).await;
    }

    pub async fn stats(&self) -> CacheStats {
        let exact_entries = self.exact.len().await;
        let fuzzy_entries = self.fuzzy.len().await;
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            exact_entries,
            fuzzy_entries,
            exact_hits: counters.exact_hits,
            fuzzy_hits: counters.fuzzy_hits,
            similar_hits: counters.similar_hits,
            misses: counters.misses,
        }
    }

    /// Empty both tiers and persist the empty state.
    pub async fn clear(&self) {
        self.exact.clear(self.store.as_ref()).await;
        self.fuzzy.clear(self.store.as_ref()).await;
    }
}

fn filler_pattern(phrases: &[String]) -> Result<Option<Regex>, ConfigError> {
    if phrases.is_empty() {
        return Ok(None);
    }
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(&p.to_lowercase()))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"\b(?:{})\b", alternation);
    Regex::new(&pattern)
        .map(Some)
        .map_err(|source| ConfigError::Pattern { pattern, source })
}
