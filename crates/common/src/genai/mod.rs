//! Generative-text capability abstraction
//!
//! Callers receive an explicit `GenResult` from every capability call and
//! degrade to empty results on failure; no capability error is allowed to
//! escape the component that made the call. Replies are free text expected
//! to contain a JSON array, optionally wrapped in a fenced code block.

use crate::config::GenAiConfig;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure kinds surfaced by capability-call wrappers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenFailure {
    #[error("generative capability not configured")]
    Unavailable,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("capability returned no usable text")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),
}

pub type GenResult<T> = std::result::Result<T, GenFailure>;

/// A raw generative-call output element, before or after validation.
///
/// Every candidate passes through an explicit validation step that either
/// promotes it to `Valid` or rejects it with a reason; downstream code only
/// ever touches the `Valid` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate<T> {
    Valid(T),
    Rejected { reason: String },
}

impl<T> Candidate<T> {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Candidate::Rejected {
            reason: reason.into(),
        }
    }
}

/// Trait for text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate free text for the given prompt
    async fn generate(&self, prompt: &str) -> GenResult<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Gemini `generateContent` client
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(config: &GenAiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.text_model.clone(),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> GenResult<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_url, self.model, self.api_key
        );

        let payload = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GenFailure::Transport(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(GenFailure::Transport(format!(
                "API error: {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenFailure::Transport(format!("Parse error: {}", e)))?;

        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|text| text.to_string())
            .ok_or(GenFailure::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Explicit absent-state capability: every call reports `Unavailable`.
/// Used when no API key is configured so that call sites degrade
/// uniformly instead of checking for a missing client.
pub struct UnavailableGenerator;

#[async_trait]
impl TextGenerator for UnavailableGenerator {
    async fn generate(&self, _prompt: &str) -> GenResult<String> {
        Err(GenFailure::Unavailable)
    }

    fn model_name(&self) -> &str {
        "unavailable"
    }
}

/// Scripted generator for tests and the `mock` provider: always replies
/// with a fixed string and counts invocations.
pub struct MockGenerator {
    response: String,
    calls: AtomicUsize,
}

impl MockGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, _prompt: &str) -> GenResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

/// Create a text generator based on configuration
pub fn create_generator(config: &GenAiConfig) -> Arc<dyn TextGenerator> {
    match config.api_key.as_str() {
        "" => {
            tracing::warn!("No generative API key configured, text generation is unavailable");
            Arc::new(UnavailableGenerator)
        }
        "mock" => Arc::new(MockGenerator::new("[]")),
        _ => Arc::new(GeminiGenerator::new(config)),
    }
}

/// Strip an optional Markdown code fence from a capability reply
pub fn strip_code_fence(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Parse a capability reply as a JSON array, stripping fences first
pub fn parse_json_array(raw: &str) -> GenResult<Vec<serde_json::Value>> {
    let cleaned = strip_code_fence(raw);
    let value: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| GenFailure::Malformed(format!("not valid JSON: {}", e)))?;

    match value {
        serde_json::Value::Array(items) => Ok(items),
        other => Err(GenFailure::Malformed(format!(
            "expected a JSON array, got {}",
            match other {
                serde_json::Value::Object(_) => "an object",
                serde_json::Value::String(_) => "a string",
                serde_json::Value::Number(_) => "a number",
                serde_json::Value::Bool(_) => "a boolean",
                serde_json::Value::Null => "null",
                serde_json::Value::Array(_) => unreachable!(),
            }
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  [1]  "), "[1]");
        assert_eq!(strip_code_fence("[1]"), "[1]");
    }

    #[test]
    fn test_parse_json_array_accepts_fenced_payload() {
        let items = parse_json_array("```json\n[{\"name\": \"SEIZE\"}]\n```").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "SEIZE");
    }

    #[test]
    fn test_parse_json_array_rejects_non_json() {
        let err = parse_json_array("not json").unwrap_err();
        assert!(matches!(err, GenFailure::Malformed(_)));
    }

    #[test]
    fn test_parse_json_array_rejects_non_array() {
        let err = parse_json_array("{\"name\": \"SEIZE\"}").unwrap_err();
        assert!(matches!(err, GenFailure::Malformed(_)));
    }

    #[tokio::test]
    async fn test_mock_generator_counts_calls() {
        let generator = MockGenerator::new("[]");
        assert_eq!(generator.call_count(), 0);
        let reply = generator.generate("prompt").await.unwrap();
        assert_eq!(reply, "[]");
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_generator_reports_unavailable() {
        let generator = UnavailableGenerator;
        let err = generator.generate("prompt").await.unwrap_err();
        assert_eq!(err, GenFailure::Unavailable);
    }
}
