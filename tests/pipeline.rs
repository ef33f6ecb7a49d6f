//! End-to-end pipeline tests with scripted collaborators.
//!
//! Generation and semantic search are replaced by in-process mocks; the
//! cache, metrics, and sessions share one in-memory store.

use async_trait::async_trait;
use handbook_assistant::chat::{
    Assistant, ChatSettings, Collaborators, Outcome, APOLOGY_MESSAGE, EMPTY_QUERY_MESSAGE,
};
use handbook_assistant_core::cache::{CacheConfig, CacheLayer, MatchKind};
use handbook_assistant_core::domain::DomainVocabulary;
use handbook_assistant_core::enforcer::EnforcerThresholds;
use handbook_assistant_core::error::{GenerationError, RetrievalError};
use handbook_assistant_core::generation::{Generation, GenerationRequest, Generator, TokenUsage};
use handbook_assistant_core::models::DocumentChunk;
use handbook_assistant_core::search::{HybridRetriever, RetrievalConfig};
use handbook_assistant_core::semantic::{SemanticHit, SemanticSearch};
use handbook_assistant_core::store::memory::InMemoryKvStore;
use handbook_assistant_core::store::KvStore;
use handbook_assistant_core::telemetry::{MetricsRecorder, TelemetryConfig};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MR_QUERY: &str = "How do merge requests get approved?";
const MR_ANSWER: &str = "A reviewer approves the merge request once the checks pass.";
const MR_URL: &str = "https://handbook.example/merge-requests";

#[derive(Clone, Copy)]
enum Behavior {
    Answer,
    Transient,
    Permanent,
}

struct ScriptedGenerator {
    behavior: Behavior,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<Generation, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.to_string());
        match self.behavior {
            Behavior::Answer => Ok(Generation {
                text: MR_ANSWER.to_string(),
                usage: Some(TokenUsage {
                    input_tokens: 40,
                    output_tokens: 12,
                    total_tokens: 52,
                }),
            }),
            Behavior::Transient => Err(GenerationError::Transient("503 unavailable".into())),
            Behavior::Permanent => Err(GenerationError::Permanent("400 bad request".into())),
        }
    }
}

/// Always returns the merge request page.
struct FixedSemantic;

#[async_trait]
impl SemanticSearch for FixedSemantic {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SemanticHit>, RetrievalError> {
        let metadata = json!({ "title": "Merge Requests", "url": MR_URL });
        Ok(vec![SemanticHit {
            content: "Merge requests are approved by a reviewer after the checks pass.".into(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            similarity: 0.8,
        }])
    }
}

fn chunk(url: &str, title: &str, content: &str) -> DocumentChunk {
    DocumentChunk {
        url: url.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        headings: Vec::new(),
        word_count: content.split_whitespace().count(),
        chunk_index: 0,
        total_chunks: 1,
    }
}

fn corpus() -> Vec<DocumentChunk> {
    vec![
        chunk(
            MR_URL,
            "Merge Requests",
            "Merge requests are approved by a reviewer after the checks pass.",
        ),
        chunk(
            "https://handbook.example/travel",
            "Travel",
            "Book flights through the travel portal and file expenses within a month.",
        ),
        chunk(
            "https://handbook.example/security",
            "Security",
            "Rotate credentials every quarter and report incidents immediately.",
        ),
    ]
}

struct Harness {
    assistant: Assistant,
    generator: Arc<ScriptedGenerator>,
    cache: Arc<CacheLayer>,
    metrics: Arc<MetricsRecorder>,
    store: Arc<dyn KvStore>,
}

fn settings(start_focused: bool) -> ChatSettings {
    ChatSettings {
        min_request_interval: Duration::ZERO,
        retry_backoff: Duration::ZERO,
        start_focused,
        ..ChatSettings::default()
    }
}

async fn harness_with(
    behavior: Behavior,
    settings: ChatSettings,
    store: Arc<dyn KvStore>,
) -> Harness {
    let vocab = DomainVocabulary::default();
    let cache = Arc::new(
        CacheLayer::open(store.clone(), &CacheConfig::default(), &vocab)
            .await
            .unwrap(),
    );
    let metrics =
        Arc::new(MetricsRecorder::open(store.clone(), TelemetryConfig::default(), &vocab).await);
    let retriever = Arc::new(
        HybridRetriever::new(&vocab, &RetrievalConfig::default(), Arc::new(FixedSemantic))
            .unwrap(),
    );
    retriever.rebuild_index(corpus());
    let generator = Arc::new(ScriptedGenerator::new(behavior));

    let assistant = Assistant::new(
        &vocab,
        EnforcerThresholds::default(),
        settings,
        Collaborators {
            retriever,
            cache: cache.clone(),
            generator: generator.clone(),
            telemetry: metrics.clone(),
            store: store.clone(),
        },
    );

    Harness {
        assistant,
        generator,
        cache,
        metrics,
        store,
    }
}

async fn harness(behavior: Behavior) -> Harness {
    harness_with(behavior, settings(true), Arc::new(InMemoryKvStore::new())).await
}

#[tokio::test]
async fn test_generated_answer_is_cited_cached_and_remembered() {
    let h = harness(Behavior::Answer).await;
    let mut session = h.assistant.new_session();

    let response = h.assistant.handle(&mut session, MR_QUERY).await;
    assert_eq!(response.outcome, Outcome::Generated);
    assert_eq!(response.response, MR_ANSWER);
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].url, MR_URL);
    assert_eq!(response.token_info.total_tokens, 52);
    assert!(response.token_info.cost_usd > 0.0);

    assert_eq!(h.generator.calls(), 1);
    assert_eq!(session.memory().len(), 2);

    let stats = h.cache.stats().await;
    assert_eq!(stats.exact_entries, 1);
    assert_eq!(stats.fuzzy_entries, 1);
}

#[tokio::test]
async fn test_prompt_carries_context_and_query() {
    let h = harness(Behavior::Answer).await;
    let mut session = h.assistant.new_session();
    h.assistant.handle(&mut session, MR_QUERY).await;

    let prompts = h.generator.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("\nContext: Merge requests are approved"));
    assert!(prompts[0].ends_with(&format!("\nQ: {}\nA:", MR_QUERY)));
}

#[tokio::test]
async fn test_repeat_query_served_from_cache() {
    let h = harness(Behavior::Answer).await;
    let mut session = h.assistant.new_session();

    h.assistant.handle(&mut session, MR_QUERY).await;
    let second = h.assistant.handle(&mut session, "  how do MERGE requests get approved? ").await;

    assert_eq!(second.outcome, Outcome::CacheHit(MatchKind::Exact));
    assert_eq!(second.response, MR_ANSWER);
    assert_eq!(second.sources[0].url, MR_URL);
    assert!(second.token_info.is_zero());
    assert_eq!(h.generator.calls(), 1);

    let summary = h.metrics.summary().await;
    assert_eq!(summary.total_queries, 2);
    assert_eq!(summary.cache_hits, 1);
    assert_eq!(summary.cache_misses, 1);
}

#[tokio::test]
async fn test_template_answer_skips_generation() {
    let h = harness(Behavior::Answer).await;
    let mut session = h.assistant.new_session();

    let response = h.assistant.handle(&mut session, "What is GitLab?").await;
    assert_eq!(response.outcome, Outcome::Template);
    assert!(response.response.starts_with("GitLab is a complete DevOps platform"));
    assert!(response.sources.is_empty());
    assert!(response.token_info.is_zero());
    assert_eq!(h.generator.calls(), 0);

    // Templates are cached like any other answer.
    let again = h.assistant.handle(&mut session, "what is gitlab?").await;
    assert_eq!(again.outcome, Outcome::CacheHit(MatchKind::Exact));
    assert_eq!(again.response, response.response);
}

#[tokio::test]
async fn test_off_topic_redirect_when_unfocused() {
    let h = harness_with(
        Behavior::Answer,
        settings(false),
        Arc::new(InMemoryKvStore::new()),
    )
    .await;
    let mut session = h.assistant.new_session();

    let response = h.assistant.handle(&mut session, "best pizza in naples").await;
    assert_eq!(response.outcome, Outcome::Redirect);
    assert!(!response.response.is_empty());
    assert_eq!(h.generator.calls(), 0);
    assert_eq!(session.memory().len(), 2);

    let stats = h.cache.stats().await;
    assert_eq!(stats.exact_entries, 0);
}

#[tokio::test]
async fn test_focused_conversation_does_not_redirect() {
    let h = harness(Behavior::Answer).await;
    let mut session = h.assistant.new_session();

    let response = h.assistant.handle(&mut session, "best pizza in naples").await;
    assert_eq!(response.outcome, Outcome::Generated);
    assert_eq!(h.generator.calls(), 1);
}

#[tokio::test]
async fn test_transient_failures_exhaust_into_apology() {
    let h = harness(Behavior::Transient).await;
    let mut session = h.assistant.new_session();

    let response = h.assistant.handle(&mut session, MR_QUERY).await;
    assert_eq!(response.outcome, Outcome::Apology);
    assert_eq!(response.response, APOLOGY_MESSAGE);
    assert!(response.token_info.is_zero());
    assert!(response.sources.is_empty());
    assert_eq!(h.generator.calls(), 3);

    let stats = h.cache.stats().await;
    assert_eq!(stats.exact_entries, 0);
    assert_eq!(stats.fuzzy_entries, 0);
    assert!(session.memory().is_empty());

    let summary = h.metrics.summary().await;
    assert_eq!(summary.total_queries, 1);
    assert_eq!(summary.top_errors.len(), 1);
    assert!(summary.error_rate > 0.99);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let h = harness(Behavior::Permanent).await;
    let mut session = h.assistant.new_session();

    let response = h.assistant.handle(&mut session, MR_QUERY).await;
    assert_eq!(response.outcome, Outcome::Apology);
    assert_eq!(h.generator.calls(), 1);
}

#[tokio::test]
async fn test_invalid_input_is_rejected_without_metrics() {
    let h = harness(Behavior::Answer).await;
    let mut session = h.assistant.new_session();

    let empty = h.assistant.handle(&mut session, "   ").await;
    assert_eq!(empty.outcome, Outcome::Invalid);
    assert_eq!(empty.response, EMPTY_QUERY_MESSAGE);

    let long = "a".repeat(501);
    let too_long = h.assistant.handle(&mut session, &long).await;
    assert_eq!(too_long.outcome, Outcome::Invalid);
    assert!(too_long.response.contains("500"));

    assert_eq!(h.generator.calls(), 0);
    assert_eq!(h.metrics.summary().await.total_queries, 0);
}

#[tokio::test]
async fn test_query_at_length_limit_is_accepted() {
    let h = harness(Behavior::Answer).await;
    let mut session = h.assistant.new_session();

    let exact = format!("{}?", "merge ".repeat(83).trim_end());
    assert!(exact.chars().count() <= 500);
    let response = h.assistant.handle(&mut session, &exact).await;
    assert_ne!(response.outcome, Outcome::Invalid);
}

#[tokio::test]
async fn test_session_survives_save_and_resume() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let first = harness_with(Behavior::Answer, settings(true), store.clone()).await;
    let mut session = first.assistant.resume_session("team-chat").await;
    first.assistant.handle(&mut session, MR_QUERY).await;
    first.assistant.save_session(&session).await;

    let second = harness_with(Behavior::Answer, settings(true), first.store.clone()).await;
    let resumed = second.assistant.resume_session("team-chat").await;
    assert_eq!(resumed.id(), "team-chat");
    assert_eq!(resumed.memory().len(), 2);
    assert_eq!(resumed.domain_state(), session.domain_state());

    let summary = second.assistant.conversation_summary(&resumed);
    assert_eq!(summary.message_count, 2);
    assert_eq!(summary.model, "scripted");
    assert!(summary.last_update.is_some());

    // The cache was written through the same store.
    let hit = second.assistant.handle(&mut second.assistant.new_session(), MR_QUERY).await;
    assert_eq!(hit.outcome, Outcome::CacheHit(MatchKind::Exact));
}

#[tokio::test]
async fn test_reset_clears_memory_but_keeps_id() {
    let h = harness(Behavior::Answer).await;
    let mut session = h.assistant.new_session();
    let id = session.id().to_string();

    h.assistant.handle(&mut session, MR_QUERY).await;
    assert_eq!(session.memory().len(), 2);

    session.reset();
    assert!(session.memory().is_empty());
    assert_eq!(session.id(), id);
    assert!(session.domain_state().is_domain_focused);
}

#[tokio::test]
async fn test_suggestions_follow_topic() {
    let h = harness(Behavior::Answer).await;
    let suggestions = h.assistant.suggestions("How does code review happen?");
    assert_eq!(suggestions.len(), 4);
    assert_eq!(suggestions[0], "What is GitLab's merge request process?");
}
