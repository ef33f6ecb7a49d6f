//! `hba search`: retrieval only, no cache and no generation.
//!
//! Prints the ranked passages with their combined, keyword, and semantic
//! scores so weights and boosts can be tuned against real queries.

use anyhow::Result;

use crate::bootstrap;
use crate::config::Config;

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    semantic_only: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let retriever = bootstrap::build_retriever(config)?;
    let top_k = limit.unwrap_or(config.retrieval.top_k).max(1);
    let use_hybrid = config.retrieval.use_hybrid && !semantic_only;

    let results = retriever.search(query, top_k, use_hybrid).await;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, result.combined_score, result.source.title);
        println!(
            "    keyword: {:.3}  semantic: {:.3}",
            result.keyword_score, result.semantic_score
        );
        println!("    url: {}", result.source.url);
        let excerpt: String = result.content.chars().take(160).collect();
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!();
    }

    Ok(())
}
