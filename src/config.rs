//! TOML configuration parsing and validation.
//!
//! Only `[db]` is required. Every other section falls back to defaults that
//! describe the GitLab handbook domain with generation and semantic search
//! disabled, which is enough to run keyword-only retrieval and the template
//! shortcuts offline.

use anyhow::{bail, Context, Result};
use handbook_assistant_core::cache::CacheConfig;
use handbook_assistant_core::domain::DomainVocabulary;
use handbook_assistant_core::enforcer::EnforcerThresholds;
use handbook_assistant_core::generation::Pricing;
use handbook_assistant_core::search::RetrievalConfig;
use handbook_assistant_core::telemetry::TelemetryConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub semantic: SemanticConfig,
    #[serde(default)]
    pub enforcer: EnforcerThresholds,
    #[serde(default)]
    pub domain: DomainVocabulary,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// JSON array of document chunks.
    #[serde(default = "default_corpus_path")]
    pub path: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: default_corpus_path(),
        }
    }
}

fn default_corpus_path() -> PathBuf {
    PathBuf::from("./data/chunks.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Characters of the top passage included in the prompt.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Conversation memory size, in messages.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Whether a new conversation starts in the domain-focused state.
    #[serde(default = "default_start_focused")]
    pub start_focused: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_query_length: default_max_query_length(),
            min_request_interval_ms: default_min_request_interval_ms(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_context_chars: default_max_context_chars(),
            max_history: default_max_history(),
            start_focused: default_start_focused(),
        }
    }
}

fn default_max_query_length() -> usize {
    500
}
fn default_min_request_interval_ms() -> u64 {
    100
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_max_context_chars() -> usize {
    100
}
fn default_max_history() -> usize {
    10
}
fn default_start_focused() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override; each provider has its own default.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_input_cost")]
    pub input_cost_per_1k: f64,
    #[serde(default = "default_output_cost")]
    pub output_cost_per_1k: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            input_cost_per_1k: default_input_cost(),
            output_cost_per_1k: default_output_cost(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn pricing(&self) -> Pricing {
        Pricing {
            input_cost_per_1k: self.input_cost_per_1k,
            output_cost_per_1k: self.output_cost_per_1k,
        }
    }
}

fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.7
}
fn default_input_cost() -> f64 {
    Pricing::default().input_cost_per_1k
}
fn default_output_cost() -> f64 {
    Pricing::default().output_cost_per_1k
}

#[derive(Debug, Deserialize, Clone)]
pub struct SemanticConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    let r = &config.retrieval;
    if r.semantic_weight < 0.0 || r.keyword_weight < 0.0 {
        bail!("retrieval weights must be >= 0");
    }
    if r.semantic_weight + r.keyword_weight <= 0.0 {
        bail!("retrieval.semantic_weight + retrieval.keyword_weight must be > 0");
    }
    if r.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Validate cache
    let c = &config.cache;
    if c.exact_ttl_secs <= 0 || c.fuzzy_ttl_secs <= 0 {
        bail!("cache TTLs must be > 0");
    }
    if c.exact_capacity < 1 || c.fuzzy_capacity < 1 {
        bail!("cache capacities must be >= 1");
    }
    if !(c.similarity_threshold > 0.0 && c.similarity_threshold <= 1.0) {
        bail!("cache.similarity_threshold must be in (0.0, 1.0]");
    }

    // Validate chat
    if config.chat.max_query_length < 1 {
        bail!("chat.max_query_length must be >= 1");
    }
    if config.chat.max_attempts < 1 {
        bail!("chat.max_attempts must be >= 1");
    }

    // Validate providers
    match config.generation.provider.as_str() {
        "disabled" => {}
        "gemini" | "openai" => {
            if config.generation.model.is_none() {
                bail!(
                    "generation.model must be specified when provider is '{}'",
                    config.generation.provider
                );
            }
        }
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, gemini, or openai.",
            other
        ),
    }

    match config.semantic.provider.as_str() {
        "disabled" => {}
        "http" => {
            if config.semantic.url.is_none() {
                bail!("semantic.url must be specified when provider is 'http'");
            }
        }
        other => bail!(
            "Unknown semantic provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"./data/hba.sqlite\"\n").unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.cache.exact_capacity, 500);
        assert_eq!(config.chat.max_query_length, 500);
        assert!(config.chat.start_focused);
        assert!(!config.generation.is_enabled());
        assert_eq!(config.generation.max_tokens, 512);
        assert_eq!(config.domain.name, "GitLab");
        assert_eq!(config.corpus.path, PathBuf::from("./data/chunks.json"));
    }

    #[test]
    fn test_sections_override() {
        let config = parse(
            r#"
[db]
path = "x.sqlite"

[retrieval]
semantic_weight = 0.5
keyword_weight = 0.5
top_k = 5

[retrieval.boosts]
keyword = 0.05

[cache]
similarity_threshold = 0.9

[domain]
name = "Acme"
"#,
        )
        .unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.boosts.keyword, 0.05);
        assert_eq!(config.retrieval.boosts.entity, 0.15);
        assert_eq!(config.cache.similarity_threshold, 0.9);
        assert_eq!(config.cache.fuzzy_capacity, 1000);
        assert_eq!(config.domain.name, "Acme");
        assert!(!config.domain.entities.is_empty());
    }

    #[test]
    fn test_rejects_bad_values() {
        let base = "[db]\npath = \"x\"\n";
        assert!(parse(&format!("{}[retrieval]\nsemantic_weight = 0.0\nkeyword_weight = 0.0\n", base)).is_err());
        assert!(parse(&format!("{}[cache]\nexact_capacity = 0\n", base)).is_err());
        assert!(parse(&format!("{}[cache]\nsimilarity_threshold = 1.5\n", base)).is_err());
        assert!(parse(&format!("{}[generation]\nprovider = \"bard\"\n", base)).is_err());
        assert!(parse(&format!("{}[generation]\nprovider = \"gemini\"\n", base)).is_err());
        assert!(parse(&format!("{}[semantic]\nprovider = \"http\"\n", base)).is_err());
    }

    #[test]
    fn test_missing_db_section_fails() {
        assert!(parse("[chat]\nmax_query_length = 10\n").is_err());
    }
}
