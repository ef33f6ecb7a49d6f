//! Corpus loading.
//!
//! The corpus is a JSON array of document chunks produced by an external
//! ingestion step. A missing file is not an error: the assistant starts
//! with an empty keyword index and answers from templates, the cache, and
//! semantic search.

use anyhow::{Context, Result};
use handbook_assistant_core::models::DocumentChunk;
use std::path::Path;
use tracing::{info, warn};

pub fn load_chunks(path: &Path) -> Result<Vec<DocumentChunk>> {
    if !path.exists() {
        warn!(path = %path.display(), "corpus file not found; keyword index will be empty");
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
    let chunks: Vec<DocumentChunk> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse corpus file: {}", path.display()))?;

    info!(path = %path.display(), chunks = chunks.len(), "loaded corpus");
    Ok(chunks)
}
