//! `hba cache` and `hba metrics`: cache administration and the
//! performance summary.

use anyhow::Result;
use handbook_assistant_core::store::KvStore;
use std::sync::Arc;

use crate::bootstrap;
use crate::config::Config;

pub async fn run_cache_stats(config: &Config) -> Result<()> {
    let sqlite = bootstrap::open_store(config).await?;
    let stored = sqlite.namespaces().await?;
    let store: Arc<dyn KvStore> = sqlite;
    let cache = bootstrap::open_cache(config, store).await?;
    let stats = cache.stats().await;

    println!("Response Cache");
    println!("==============");
    println!();
    println!(
        "  Exact tier:  {:>5} / {} entries (TTL {}s)",
        stats.exact_entries, config.cache.exact_capacity, config.cache.exact_ttl_secs
    );
    println!(
        "  Fuzzy tier:  {:>5} / {} entries (TTL {}s)",
        stats.fuzzy_entries, config.cache.fuzzy_capacity, config.cache.fuzzy_ttl_secs
    );
    println!(
        "  Similarity threshold: {:.2}",
        config.cache.similarity_threshold
    );

    if !stored.is_empty() {
        println!();
        println!("  Stored rows:");
        for (namespace, rows) in &stored {
            println!("    {:<20} {:>6}", namespace, rows);
        }
    }
    println!();
    Ok(())
}

pub async fn run_cache_clear(config: &Config) -> Result<()> {
    let store: Arc<dyn KvStore> = bootstrap::open_store(config).await?;
    let cache = bootstrap::open_cache(config, store).await?;
    let before = cache.stats().await;
    cache.clear().await;
    println!(
        "Cache cleared ({} exact, {} fuzzy entries removed).",
        before.exact_entries, before.fuzzy_entries
    );
    Ok(())
}

pub async fn run_metrics(config: &Config) -> Result<()> {
    let store: Arc<dyn KvStore> = bootstrap::open_store(config).await?;
    let metrics = bootstrap::open_metrics(config, store).await;
    let s = metrics.summary().await;

    println!("Performance Summary");
    println!("===================");
    println!();
    println!("  Status:          {}", s.status);
    println!("  Queries:         {}", s.total_queries);
    println!(
        "  Cache hit rate:  {:.1}% ({} hits, {} misses)",
        s.cache_hit_rate * 100.0,
        s.cache_hits,
        s.cache_misses
    );
    println!("  Error rate:      {:.1}%", s.error_rate * 100.0);
    println!(
        "  Avg response:    {:.3}s (last 10: {:.3}s)",
        s.avg_response_time_secs, s.recent_avg_response_time_secs
    );
    println!(
        "  Tokens:          {} total, {:.1} per query",
        s.total_tokens, s.avg_tokens_per_query
    );
    println!(
        "  Cost:            ${:.6} total, ${:.6} per query",
        s.total_cost_usd, s.avg_cost_per_query
    );

    if !s.categories.is_empty() {
        println!();
        println!("  By category:");
        for (category, count) in &s.categories {
            println!("    {:<20} {:>6}", category, count);
        }
    }

    if !s.top_errors.is_empty() {
        println!();
        println!("  Top errors:");
        for (error, count) in &s.top_errors {
            println!("    {:<20} {:>6}", error, count);
        }
    }

    println!();
    Ok(())
}
