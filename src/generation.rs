//! Text generation providers.
//!
//! Implements the core [`Generator`] trait:
//! - **[`DisabledGenerator`]**: always fails; used when no provider is configured.
//! - **[`GeminiGenerator`]**: `POST {url}/v1beta/models/{model}:generateContent`.
//! - **[`OpenAiGenerator`]**: `POST {url}/v1/chat/completions`.
//!
//! Each call makes exactly one HTTP request. Retries belong to the chat
//! pipeline, which needs to know whether a failure is worth retrying:
//! - HTTP 429 (rate limited) and 5xx (server error) → [`GenerationError::Transient`]
//! - Network errors and timeouts → [`GenerationError::Transient`]
//! - Other HTTP 4xx and malformed responses → [`GenerationError::Permanent`]

use anyhow::{bail, Result};
use async_trait::async_trait;
use handbook_assistant_core::error::GenerationError;
use handbook_assistant_core::generation::{Generation, GenerationRequest, Generator, TokenUsage};
use std::time::Duration;

use crate::config::GenerationConfig;

const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";

/// Map a non-success HTTP status to a generation error.
fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> GenerationError {
    let message = format!("{} API error {}: {}", provider, status, body);
    if status.as_u16() == 429 || status.is_server_error() {
        GenerationError::Transient(message)
    } else {
        GenerationError::Permanent(message)
    }
}

fn network_error(provider: &str, e: reqwest::Error) -> GenerationError {
    GenerationError::Transient(format!("{} request failed: {}", provider, e))
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a prepared request and return the parsed JSON body.
async fn send_json(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, GenerationError> {
    let response = request
        .send()
        .await
        .map_err(|e| network_error(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(status_error(provider, status, &body_text));
    }

    response
        .json()
        .await
        .map_err(|e| GenerationError::Permanent(format!("{} returned invalid JSON: {}", provider, e)))
}

fn as_count(value: Option<&serde_json::Value>) -> Option<u64> {
    value.and_then(|v| v.as_u64())
}

// ============ Disabled Generator ============

/// A generator that always fails with [`GenerationError::Disabled`].
///
/// Used when `generation.provider = "disabled"`. Templates and cache hits
/// still answer; everything else ends in the apology message.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerationRequest<'_>) -> Result<Generation, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

// ============ Gemini Generator ============

/// Google Gemini `generateContent` API.
///
/// Requires the `GOOGLE_API_KEY` environment variable.
pub struct GeminiGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Gemini provider"))?;
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY environment variable not set"))?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_DEFAULT_URL.to_string()),
            model,
            api_key,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<Generation, GenerationError> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "temperature": request.temperature,
            },
        });

        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            self.url.trim_end_matches('/'),
            self.model
        );
        let json = send_json(
            "Gemini",
            self.client
                .post(endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&body),
        )
        .await?;

        parse_gemini_response(&json)
    }
}

/// Extract `candidates[0].content.parts[*].text` and `usageMetadata`.
fn parse_gemini_response(json: &serde_json::Value) -> Result<Generation, GenerationError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| GenerationError::Permanent("Invalid Gemini response: missing candidate parts".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err(GenerationError::Permanent("Gemini returned an empty response".into()));
    }

    let usage = json.get("usageMetadata").and_then(|u| {
        let input = as_count(u.get("promptTokenCount"))?;
        let output = as_count(u.get("candidatesTokenCount"))?;
        Some(TokenUsage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: as_count(u.get("totalTokenCount")).unwrap_or(input + output),
        })
    });

    Ok(Generation { text, usage })
}

// ============ OpenAI Generator ============

/// OpenAI-compatible chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable. `generation.url`
/// may point at any compatible server.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string()),
            model,
            api_key,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<Generation, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let endpoint = format!("{}/v1/chat/completions", self.url.trim_end_matches('/'));
        let json = send_json(
            "OpenAI",
            self.client
                .post(endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body),
        )
        .await?;

        parse_openai_response(&json)
    }
}

/// Extract `choices[0].message.content` and `usage`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Generation, GenerationError> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| GenerationError::Permanent("Invalid OpenAI response: missing message content".into()))?
        .to_string();
    if text.trim().is_empty() {
        return Err(GenerationError::Permanent("OpenAI returned an empty response".into()));
    }

    let usage = json.get("usage").and_then(|u| {
        let input = as_count(u.get("prompt_tokens"))?;
        let output = as_count(u.get("completion_tokens"))?;
        Some(TokenUsage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: as_count(u.get("total_tokens")).unwrap_or(input + output),
        })
    });

    Ok(Generation { text, usage })
}

/// Create the configured [`Generator`].
///
/// | Config Value | Generator |
/// |-------------|-----------|
/// | `"disabled"` | [`DisabledGenerator`] |
/// | `"gemini"` | [`GeminiGenerator`] |
/// | `"openai"` | [`OpenAiGenerator`] |
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "gemini" => Ok(Box::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classification() {
        let transient = status_error("X", reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(transient.is_transient());
        assert!(status_error("X", reqwest::StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!status_error("X", reqwest::StatusCode::UNAUTHORIZED, "").is_transient());
    }

    #[test]
    fn test_parse_gemini() {
        let json = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hello " }, { "text": "there" }] } }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 3, "totalTokenCount": 15 }
        });
        let generation = parse_gemini_response(&json).unwrap();
        assert_eq!(generation.text, "Hello there");
        assert_eq!(generation.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_gemini_without_usage() {
        let json = json!({ "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }] });
        assert!(parse_gemini_response(&json).unwrap().usage.is_none());
        assert!(parse_gemini_response(&json!({ "candidates": [] })).is_err());
    }

    #[test]
    fn test_parse_openai() {
        let json = json!({
            "choices": [{ "message": { "role": "assistant", "content": "Answer" } }],
            "usage": { "prompt_tokens": 20, "completion_tokens": 5 }
        });
        let generation = parse_openai_response(&json).unwrap();
        assert_eq!(generation.text, "Answer");
        let usage = generation.usage.unwrap();
        assert_eq!(usage.input_tokens, 20);
        assert_eq!(usage.total_tokens, 25);
    }

    #[test]
    fn test_empty_text_is_permanent() {
        let json = json!({ "choices": [{ "message": { "content": "  " } }] });
        let err = parse_openai_response(&json).unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_disabled_generator_fails() {
        let generator = create_generator(&GenerationConfig::default()).unwrap();
        assert_eq!(generator.model_name(), "disabled");
        let request = GenerationRequest {
            prompt: "hi",
            max_tokens: 10,
            temperature: 0.0,
        };
        assert!(matches!(
            generator.generate(&request).await,
            Err(GenerationError::Disabled)
        ));
    }
}
