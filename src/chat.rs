//! The chat pipeline.
//!
//! [`Assistant`] holds everything shared between conversations (retriever,
//! cache, enforcer, collaborators); [`Session`] holds everything owned by a
//! single conversation (memory, domain state, throttle clock). A turn is
//! [`Assistant::handle`], which never fails:
//!
//! | Step | Short-circuits with |
//! |------|---------------------|
//! | validate | a user-facing message, no metrics |
//! | throttle | never; sleeps off the remainder of the minimum spacing |
//! | cache lookup | the cached answer |
//! | template match | the canned answer, which is also cached |
//! | domain enforcement | a redirect message |
//! | retrieve, prompt, generate with retry | an apology once attempts run out |
//! | memory, domain state, cache write | the generated answer |
//!
//! Every outcome after validation emits one [`QueryMetrics`] record.

use chrono::{DateTime, Utc};
use handbook_assistant_core::cache::{CacheLayer, CacheStats, MatchKind};
use handbook_assistant_core::domain::{DomainVocabulary, Template};
use handbook_assistant_core::enforcer::{
    ConversationDomainState, DomainEnforcer, DomainSummary, EnforcerThresholds,
};
use handbook_assistant_core::generation::{Generation, GenerationRequest, Generator, Pricing};
use handbook_assistant_core::memory::{ConversationMemory, Role};
use handbook_assistant_core::models::{SearchResult, SourceRef, TokenInfo};
use handbook_assistant_core::rules::RuleTable;
use handbook_assistant_core::search::HybridRetriever;
use handbook_assistant_core::store::KvStore;
use handbook_assistant_core::suggestions::FollowUpSuggester;
use handbook_assistant_core::telemetry::{QueryMetrics, TelemetrySink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;

pub const EMPTY_QUERY_MESSAGE: &str = "Please provide a valid question.";
pub const APOLOGY_MESSAGE: &str =
    "I apologize, but I'm having trouble processing your request right now. Please try again.";
pub const SESSIONS_NAMESPACE: &str = "sessions";

const GENERATION_FAILED: &str = "generation_failed";

/// Per-turn tuning taken from `[chat]`, `[retrieval]`, and `[generation]`.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub max_query_length: usize,
    pub min_request_interval: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub max_context_chars: usize,
    pub max_history: usize,
    pub start_focused: bool,
    pub top_k: usize,
    pub use_hybrid: bool,
    pub max_tokens: u32,
    pub temperature: f32,
    pub pricing: Pricing,
}

impl ChatSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_query_length: config.chat.max_query_length,
            min_request_interval: Duration::from_millis(config.chat.min_request_interval_ms),
            max_attempts: config.chat.max_attempts,
            retry_backoff: Duration::from_millis(config.chat.retry_backoff_ms),
            max_context_chars: config.chat.max_context_chars,
            max_history: config.chat.max_history,
            start_focused: config.chat.start_focused,
            top_k: config.retrieval.top_k,
            use_hybrid: config.retrieval.use_hybrid,
            max_tokens: config.generation.max_tokens,
            temperature: config.generation.temperature,
            pricing: config.generation.pricing(),
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_query_length: 500,
            min_request_interval: Duration::from_millis(100),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            max_context_chars: 100,
            max_history: 10,
            start_focused: true,
            top_k: 3,
            use_hybrid: true,
            max_tokens: 512,
            temperature: 0.7,
            pricing: Pricing::default(),
        }
    }
}

/// The external services and shared stores an [`Assistant`] drives.
pub struct Collaborators {
    pub retriever: Arc<HybridRetriever>,
    pub cache: Arc<CacheLayer>,
    pub generator: Arc<dyn Generator>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub store: Arc<dyn KvStore>,
}

/// How a turn was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Invalid,
    CacheHit(MatchKind),
    Template,
    Redirect,
    Generated,
    Apology,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub token_info: TokenInfo,
    pub outcome: Outcome,
}

impl ChatResponse {
    fn free(response: String, sources: Vec<SourceRef>, outcome: Outcome) -> Self {
        Self {
            response,
            sources,
            token_info: TokenInfo::zero(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub session_id: String,
    pub message_count: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub model: String,
}

/// One conversation.
#[derive(Debug)]
pub struct Session {
    id: String,
    memory: ConversationMemory,
    domain_state: ConversationDomainState,
    start_focused: bool,
    last_request: Option<Instant>,
}

#[derive(Serialize, Deserialize)]
struct SessionSnapshot {
    memory: ConversationMemory,
    domain_state: ConversationDomainState,
}

impl Session {
    fn new(id: String, max_history: usize, start_focused: bool) -> Self {
        Self {
            id,
            memory: ConversationMemory::new(max_history),
            domain_state: ConversationDomainState::new(start_focused),
            start_focused,
            last_request: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn domain_state(&self) -> &ConversationDomainState {
        &self.domain_state
    }

    /// Forget the conversation but keep the session id.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.domain_state = ConversationDomainState::new(self.start_focused);
    }
}

pub struct Assistant {
    retriever: Arc<HybridRetriever>,
    cache: Arc<CacheLayer>,
    generator: Arc<dyn Generator>,
    telemetry: Arc<dyn TelemetrySink>,
    store: Arc<dyn KvStore>,
    enforcer: DomainEnforcer,
    templates: RuleTable<Template>,
    suggester: FollowUpSuggester,
    settings: ChatSettings,
}

impl Assistant {
    pub fn new(
        vocab: &DomainVocabulary,
        thresholds: EnforcerThresholds,
        settings: ChatSettings,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            retriever: collaborators.retriever,
            cache: collaborators.cache,
            generator: collaborators.generator,
            telemetry: collaborators.telemetry,
            store: collaborators.store,
            enforcer: DomainEnforcer::new(vocab, thresholds),
            templates: vocab.template_table(),
            suggester: FollowUpSuggester::from_vocabulary(vocab),
            settings,
        }
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn new_session(&self) -> Session {
        Session::new(
            uuid::Uuid::new_v4().to_string(),
            self.settings.max_history,
            self.settings.start_focused,
        )
    }

    /// Restore a saved session, or start a fresh one under `id`.
    pub async fn resume_session(&self, id: &str) -> Session {
        let mut session = Session::new(id.to_string(), self.settings.max_history, self.settings.start_focused);
        match self.store.load(SESSIONS_NAMESPACE).await {
            Ok(mut saved) => {
                if let Some(value) = saved.remove(id) {
                    match serde_json::from_value::<SessionSnapshot>(value) {
                        Ok(snapshot) => {
                            session.memory = snapshot.memory;
                            session.domain_state = snapshot.domain_state;
                            debug!(session = id, messages = session.memory.len(), "resumed session");
                        }
                        Err(e) => warn!(session = id, error = %e, "discarding undecodable session"),
                    }
                }
            }
            Err(e) => error!(error = %e, "session load failed; starting fresh"),
        }
        session
    }

    pub async fn save_session(&self, session: &Session) {
        let snapshot = SessionSnapshot {
            memory: session.memory.clone(),
            domain_state: session.domain_state.clone(),
        };
        let value = match serde_json::to_value(&snapshot) {
            Ok(v) => v,
            Err(e) => {
                warn!(session = %session.id, error = %e, "failed to encode session");
                return;
            }
        };
        let mut saved = match self.store.load(SESSIONS_NAMESPACE).await {
            Ok(saved) => saved,
            Err(e) => {
                error!(error = %e, "session load failed; session not saved");
                return;
            }
        };
        saved.insert(session.id.clone(), value);
        if let Err(e) = self.store.save(SESSIONS_NAMESPACE, &saved).await {
            error!(error = %e, "session save failed");
        }
    }

    pub fn conversation_summary(&self, session: &Session) -> ConversationSummary {
        ConversationSummary {
            session_id: session.id.clone(),
            message_count: session.memory.len(),
            last_update: session.memory.last_update(),
            model: self.generator.model_name().to_string(),
        }
    }

    pub fn domain_summary(&self, session: &Session) -> DomainSummary {
        self.enforcer.summary(&session.domain_state)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub fn suggestions(&self, query: &str) -> Vec<String> {
        self.suggester.suggest(query)
    }

    /// Answer one query. Never fails; see the module docs for the order.
    pub async fn handle(&self, session: &mut Session, query: &str) -> ChatResponse {
        let query = query.trim();
        if query.is_empty() {
            return ChatResponse::free(EMPTY_QUERY_MESSAGE.to_string(), Vec::new(), Outcome::Invalid);
        }
        if query.chars().count() > self.settings.max_query_length {
            let message = format!(
                "Query too long. Please keep it under {} characters.",
                self.settings.max_query_length
            );
            return ChatResponse::free(message, Vec::new(), Outcome::Invalid);
        }

        self.throttle(session).await;

        let started = Instant::now();
        let response = self.answer(session, query).await;
        self.emit_metrics(session, query, &response, started.elapsed())
            .await;
        response
    }

    async fn throttle(&self, session: &mut Session) {
        if let Some(last) = session.last_request {
            let elapsed = Instant::now().saturating_duration_since(last);
            if elapsed < self.settings.min_request_interval {
                let wait = self.settings.min_request_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "throttling request");
                tokio::time::sleep(wait).await;
            }
        }
        session.last_request = Some(Instant::now());
    }

    async fn answer(&self, session: &mut Session, query: &str) -> ChatResponse {
        if let Some(hit) = self.cache.lookup(query).await {
            info!(kind = %hit.kind, "cache hit");
            return ChatResponse::free(hit.response, hit.sources, Outcome::CacheHit(hit.kind));
        }

        if let Some(template) = self.templates.first_match(query) {
            debug!(template = %template.key, "template answer");
            self.cache
                .store(query, &template.response, &[], serde_json::json!({ "type": "template" }))
                .await;
            return ChatResponse::free(template.response.clone(), Vec::new(), Outcome::Template);
        }

        if self.enforcer.should_redirect(query, &session.domain_state) {
            let message = self.enforcer.redirect_message(&session.domain_state);
            session.memory.add(Role::User, query, None);
            session.memory.add(Role::Assistant, &message, None);
            self.enforcer.update(&mut session.domain_state, query, &message);
            info!("redirecting off-topic query");
            return ChatResponse::free(message, Vec::new(), Outcome::Redirect);
        }

        let rewritten = self.enforcer.rewrite(query, &session.domain_state);
        let passages = self
            .retriever
            .search(&rewritten, self.settings.top_k, self.settings.use_hybrid)
            .await;
        let system = self.enforcer.system_prompt(query, &session.domain_state);
        let prompt = build_prompt(&system, passages.first(), &rewritten, self.settings.max_context_chars);

        let Some(generation) = self.generate_with_retry(&prompt).await else {
            return ChatResponse::free(APOLOGY_MESSAGE.to_string(), Vec::new(), Outcome::Apology);
        };

        let token_info = self.settings.pricing.token_info(&prompt, &generation);
        let sources = cited_sources(&passages);

        session.memory.add(Role::User, query, None);
        session
            .memory
            .add(Role::Assistant, &generation.text, Some(sources.clone()));
        self.enforcer
            .update(&mut session.domain_state, query, &generation.text);

        let metadata = serde_json::json!({
            "type": "ai_generated",
            "context_docs_count": passages.len(),
            "token_info": token_info,
        });
        self.cache
            .store(query, &generation.text, &sources, metadata)
            .await;

        ChatResponse {
            response: generation.text,
            sources,
            token_info,
            outcome: Outcome::Generated,
        }
    }

    /// Retry transient failures with a fixed backoff; give up immediately
    /// on anything else.
    async fn generate_with_retry(&self, prompt: &str) -> Option<Generation> {
        let request = GenerationRequest {
            prompt,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        let attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.generator.generate(&request).await {
                Ok(generation) => return Some(generation),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(attempt, error = %e, "generation failed, retrying");
                    tokio::time::sleep(self.settings.retry_backoff).await;
                }
                Err(e) => {
                    error!(attempt, error = %e, "generation failed, giving up");
                    return None;
                }
            }
        }
        None
    }

    async fn emit_metrics(
        &self,
        session: &Session,
        query: &str,
        response: &ChatResponse,
        elapsed: Duration,
    ) {
        let metrics = QueryMetrics {
            query: query.to_string(),
            response_time_secs: elapsed.as_secs_f64(),
            cache_hit: matches!(response.outcome, Outcome::CacheHit(_)),
            confidence: session.domain_state.confidence,
            tokens: response.token_info,
            error: (response.outcome == Outcome::Apology).then(|| GENERATION_FAILED.to_string()),
            timestamp: Utc::now(),
        };
        self.telemetry.record(metrics).await;
    }
}

/// System instruction, the head of the top passage, and the query.
fn build_prompt(
    system: &str,
    top: Option<&SearchResult>,
    query: &str,
    max_context_chars: usize,
) -> String {
    let mut prompt = system.to_string();
    if let Some(passage) = top {
        let context: String = passage.content.chars().take(max_context_chars).collect();
        prompt.push_str("\nContext: ");
        prompt.push_str(&context);
    }
    prompt.push_str("\nQ: ");
    prompt.push_str(query);
    prompt.push_str("\nA:");
    prompt
}

/// Passage sources in rank order, one per URL.
fn cited_sources(passages: &[SearchResult]) -> Vec<SourceRef> {
    let mut sources: Vec<SourceRef> = Vec::with_capacity(passages.len());
    for passage in passages {
        if !sources.iter().any(|s| s.url == passage.source.url) {
            sources.push(passage.source.clone());
        }
    }
    sources
}
