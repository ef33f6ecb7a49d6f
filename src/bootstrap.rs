//! Wiring: builds the shared pipeline components from a [`Config`].

use anyhow::{Context, Result};
use handbook_assistant_core::cache::CacheLayer;
use handbook_assistant_core::search::HybridRetriever;
use handbook_assistant_core::store::KvStore;
use handbook_assistant_core::telemetry::MetricsRecorder;
use std::sync::Arc;
use tracing::info;

use crate::chat::{Assistant, ChatSettings, Collaborators};
use crate::config::Config;
use crate::corpus;
use crate::db;
use crate::generation::create_generator;
use crate::migrate;
use crate::semantic::create_semantic;
use crate::sqlite_store::SqliteKvStore;

/// Everything a CLI command may need, built once per process.
pub struct Runtime {
    pub assistant: Assistant,
    pub cache: Arc<CacheLayer>,
    pub metrics: Arc<MetricsRecorder>,
}

/// Connect to the database, creating the schema if needed.
pub async fn open_store(config: &Config) -> Result<Arc<SqliteKvStore>> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    Ok(Arc::new(SqliteKvStore::new(pool)))
}

pub async fn open_cache(config: &Config, store: Arc<dyn KvStore>) -> Result<Arc<CacheLayer>> {
    let cache = CacheLayer::open(store, &config.cache, &config.domain)
        .await
        .context("Invalid [domain.cache] vocabulary")?;
    Ok(Arc::new(cache))
}

pub async fn open_metrics(config: &Config, store: Arc<dyn KvStore>) -> Arc<MetricsRecorder> {
    Arc::new(MetricsRecorder::open(store, config.telemetry.clone(), &config.domain).await)
}

/// Retriever with its keyword index built from the configured corpus.
pub fn build_retriever(config: &Config) -> Result<Arc<HybridRetriever>> {
    let semantic = create_semantic(&config.semantic)?;
    let retriever = HybridRetriever::new(&config.domain, &config.retrieval, Arc::from(semantic))
        .context("Invalid retrieval configuration")?;

    let chunks = corpus::load_chunks(&config.corpus.path)?;
    retriever.rebuild_index(chunks);
    Ok(Arc::new(retriever))
}

pub async fn build(config: &Config) -> Result<Runtime> {
    let store: Arc<dyn KvStore> = open_store(config).await?;
    let cache = open_cache(config, store.clone()).await?;
    let metrics = open_metrics(config, store.clone()).await;
    let retriever = build_retriever(config)?;
    let generator = create_generator(&config.generation)?;

    info!(
        generator = generator.model_name(),
        semantic = %config.semantic.provider,
        "assistant ready"
    );

    let assistant = Assistant::new(
        &config.domain,
        config.enforcer.clone(),
        ChatSettings::from_config(config),
        Collaborators {
            retriever,
            cache: cache.clone(),
            generator: Arc::from(generator),
            telemetry: metrics.clone(),
            store,
        },
    );

    Ok(Runtime {
        assistant,
        cache,
        metrics,
    })
}
