//! Query metrics and performance summary.
//!
//! The orchestrator emits one [`QueryMetrics`] record per handled query to a
//! [`TelemetrySink`]. [`MetricsRecorder`] is the standard sink: it keeps
//! running totals, a bounded ring of recent records, a bounded window of
//! response times, and per-category and per-error counts, and persists the
//! lot to the `metrics` namespace after every record.
//!
//! | Status | Condition (first match) |
//! |--------|-------------------------|
//! | `no_data` | no queries recorded |
//! | `error` | error rate above 10 % |
//! | `slow` | average response time above 5 s |
//! | `warning` | cache hit rate below 30 % |
//! | `good` | otherwise |

use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::domain::DomainVocabulary;
use crate::models::TokenInfo;
use crate::rules::RuleTable;
use crate::store::{KvStore, Namespace};

pub const METRICS_NAMESPACE: &str = "metrics";
const STATE_KEY: &str = "state";

const ERROR_RATE_LIMIT: f64 = 0.10;
const SLOW_RESPONSE_SECS: f64 = 5.0;
const MIN_HIT_RATE: f64 = 0.30;
const RECENT_WINDOW: usize = 10;
const TOP_ERRORS: usize = 5;

/// One handled query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub query: String,
    pub response_time_secs: f64,
    pub cache_hit: bool,
    pub confidence: f64,
    pub tokens: TokenInfo,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record(&self, metrics: QueryMetrics);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub recent_capacity: usize,
    pub window_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 100,
            window_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    NoData,
    Error,
    Slow,
    Warning,
    Good,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::NoData => "no_data",
            HealthStatus::Error => "error",
            HealthStatus::Slow => "slow",
            HealthStatus::Warning => "warning",
            HealthStatus::Good => "good",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Totals {
    queries: u64,
    cache_hits: u64,
    cache_misses: u64,
    errors: u64,
    response_time_secs: f64,
    input_tokens: u64,
    output_tokens: u64,
    total_tokens: u64,
    cost_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct MetricsState {
    totals: Totals,
    recent: VecDeque<QueryMetrics>,
    response_times: VecDeque<f64>,
    categories: BTreeMap<String, u64>,
    errors: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub status: HealthStatus,
    pub total_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Fraction of queries answered from the cache.
    pub cache_hit_rate: f64,
    pub error_rate: f64,
    /// Mean over the response-time window.
    pub avg_response_time_secs: f64,
    pub recent_avg_response_time_secs: f64,
    pub recent_cache_hit_rate: f64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub avg_tokens_per_query: f64,
    pub avg_cost_per_query: f64,
    pub categories: BTreeMap<String, u64>,
    /// Most frequent errors, at most five, most frequent first.
    pub top_errors: Vec<(String, u64)>,
}

/// Standard [`TelemetrySink`] with KV-store persistence.
pub struct MetricsRecorder {
    state: Mutex<MetricsState>,
    store: Arc<dyn KvStore>,
    config: TelemetryConfig,
    categories: RuleTable<String>,
    fallback_category: String,
}

impl MetricsRecorder {
    pub async fn open(
        store: Arc<dyn KvStore>,
        config: TelemetryConfig,
        vocab: &DomainVocabulary,
    ) -> Self {
        let state = match store.load(METRICS_NAMESPACE).await {
            Ok(mut raw) => match raw.remove(STATE_KEY) {
                Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                    warn!(error = %e, "discarding undecodable metrics state");
                    MetricsState::default()
                }),
                None => MetricsState::default(),
            },
            Err(e) => {
                error!(error = %e, "metrics load failed; starting empty");
                MetricsState::default()
            }
        };

        Self {
            state: Mutex::new(state),
            store,
            config,
            categories: vocab.category_table(),
            fallback_category: vocab.fallback_category.clone(),
        }
    }

    pub fn categorize(&self, query: &str) -> &str {
        self.categories
            .first_match(query)
            .map(String::as_str)
            .unwrap_or(self.fallback_category.as_str())
    }

    /// The last `n` records, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<QueryMetrics> {
        let state = self.state.lock().await;
        let skip = state.recent.len().saturating_sub(n);
        state.recent.iter().skip(skip).cloned().collect()
    }

    pub async fn summary(&self) -> PerformanceSummary {
        let state = self.state.lock().await;
        summarize(&state)
    }

    async fn persist(&self, state: &MetricsState) {
        let value = match serde_json::to_value(state) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to encode metrics state");
                return;
            }
        };
        let mut entries = Namespace::new();
        entries.insert(STATE_KEY.to_string(), value);
        if let Err(e) = self.store.save(METRICS_NAMESPACE, &entries).await {
            error!(error = %e, "metrics save failed");
        }
    }
}

#[async_trait]
impl TelemetrySink for MetricsRecorder {
    async fn record(&self, metrics: QueryMetrics) {
        let category = self.categorize(&metrics.query).to_string();
        let mut state = self.state.lock().await;

        let totals = &mut state.totals;
        totals.queries += 1;
        if metrics.cache_hit {
            totals.cache_hits += 1;
        } else {
            totals.cache_misses += 1;
        }
        totals.response_time_secs += metrics.response_time_secs;
        totals.input_tokens += metrics.tokens.input_tokens;
        totals.output_tokens += metrics.tokens.output_tokens;
        totals.total_tokens += metrics.tokens.total_tokens;
        totals.cost_usd += metrics.tokens.cost_usd;
        if metrics.error.is_some() {
            totals.errors += 1;
        }

        if let Some(err) = &metrics.error {
            *state.errors.entry(err.clone()).or_insert(0) += 1;
        }
        *state.categories.entry(category.clone()).or_insert(0) += 1;

        state.response_times.push_back(metrics.response_time_secs);
        while state.response_times.len() > self.config.window_capacity {
            state.response_times.pop_front();
        }
        state.recent.push_back(metrics);
        while state.recent.len() > self.config.recent_capacity {
            state.recent.pop_front();
        }

        debug!(category = %category, queries = state.totals.queries, "recorded query metrics");
        self.persist(&state).await;
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn summarize(state: &MetricsState) -> PerformanceSummary {
    let totals = &state.totals;
    let queries = totals.queries as f64;
    let rate = |count: u64| if totals.queries == 0 { 0.0 } else { count as f64 / queries };

    let cache_hit_rate = rate(totals.cache_hits);
    let error_rate = rate(totals.errors);
    let avg_response_time_secs = mean(state.response_times.iter().copied());

    let recent: Vec<&QueryMetrics> = state.recent.iter().rev().take(RECENT_WINDOW).collect();
    let recent_avg_response_time_secs = mean(recent.iter().map(|m| m.response_time_secs));
    let recent_cache_hit_rate = mean(recent.iter().map(|m| if m.cache_hit { 1.0 } else { 0.0 }));

    let mut top_errors: Vec<(String, u64)> = state
        .errors
        .iter()
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    top_errors.sort_by_key(|(_, count)| Reverse(*count));
    top_errors.truncate(TOP_ERRORS);

    let status = if totals.queries == 0 {
        HealthStatus::NoData
    } else if error_rate > ERROR_RATE_LIMIT {
        HealthStatus::Error
    } else if avg_response_time_secs > SLOW_RESPONSE_SECS {
        HealthStatus::Slow
    } else if cache_hit_rate < MIN_HIT_RATE {
        HealthStatus::Warning
    } else {
        HealthStatus::Good
    };

    PerformanceSummary {
        status,
        total_queries: totals.queries,
        cache_hits: totals.cache_hits,
        cache_misses: totals.cache_misses,
        cache_hit_rate,
        error_rate,
        avg_response_time_secs,
        recent_avg_response_time_secs,
        recent_cache_hit_rate,
        total_tokens: totals.total_tokens,
        total_cost_usd: totals.cost_usd,
        avg_tokens_per_query: if totals.queries == 0 { 0.0 } else { totals.total_tokens as f64 / queries },
        avg_cost_per_query: if totals.queries == 0 { 0.0 } else { totals.cost_usd / queries },
        categories: state.categories.clone(),
        top_errors,
    }
}
