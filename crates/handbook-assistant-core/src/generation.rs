//! Text generation collaborator and token/cost accounting.
//!
//! The hosted completion service is reached through [`Generator`]. One call
//! is one attempt; the retry policy belongs to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::models::TokenInfo;

/// Words-to-tokens ratio used when the service reports no usage.
const TOKENS_PER_WORD: f64 = 1.3;

#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Usage counts as reported by the service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// `None` when the service omitted usage metadata.
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier, for conversation summaries.
    fn model_name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest<'_>)
        -> Result<Generation, GenerationError>;
}

/// Per-token prices. Cost is `(in · input + out · output) / 1000`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pricing {
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_cost_per_1k: 0.000075,
            output_cost_per_1k: 0.0003,
        }
    }
}

impl Pricing {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_cost_per_1k
            + output_tokens as f64 * self.output_cost_per_1k)
            / 1000.0
    }

    /// Token accounting for a completed generation, estimating usage from
    /// word counts when the service did not report it.
    pub fn token_info(&self, prompt: &str, generation: &Generation) -> TokenInfo {
        let usage = generation.usage.unwrap_or_else(|| {
            let input = estimate_tokens(prompt);
            let output = estimate_tokens(&generation.text);
            TokenUsage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: input + output,
            }
        });
        TokenInfo {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
            cost_usd: self.cost(usage.input_tokens, usage.output_tokens),
        }
    }
}

/// Rough token estimate: whitespace-separated words × 1.3, truncated.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.split_whitespace().count() as f64 * TOKENS_PER_WORD) as u64
}
