//! Embedding capability abstraction
//!
//! The raw `Embedder` trait returns provider-native vectors of whatever
//! length the model produces. The `EmbeddingGenerator` wrapper is what the
//! pipeline uses: it normalizes every vector to the fixed dimensionality
//! and degrades to a zero vector on failure so that a single bad embedding
//! call never halts an ingestion run.

use crate::config::GenAiConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Task-type hint forwarded to the embedding provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    Document,
    Query,
}

impl EmbedTask {
    pub fn as_task_type(&self) -> &'static str {
        match self {
            EmbedTask::Document => "RETRIEVAL_DOCUMENT",
            EmbedTask::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate a provider-native-length embedding for a single text
    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Gemini `embedContent` client
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(config: &GenAiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.api_url, self.model, self.api_key
        );

        let payload = serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
            "taskType": task.as_task_type(),
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::EmbeddingError(format!(
                "API error: {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::EmbeddingError(format!("Parse error: {}", e)))?;

        let values = body["embedding"]["values"]
            .as_array()
            .ok_or_else(|| AppError::EmbeddingError("Invalid response format".to_string()))?;

        Ok(values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock embedder for testing and the `mock` provider
pub struct MockEmbedder {
    dim: usize,
}

impl MockEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        Ok((0..self.dim).map(|_| rng.gen::<f32>()).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

/// Create a raw embedder based on configuration
pub fn create_embedder(config: &GenAiConfig) -> Arc<dyn Embedder> {
    if config.api_key.is_empty() || config.api_key == "mock" {
        if config.api_key.is_empty() {
            tracing::warn!("No embedding API key configured, using mock embedder");
        }
        Arc::new(MockEmbedder::new(config.embedding_dim))
    } else {
        Arc::new(GeminiEmbedder::new(config))
    }
}

/// Dimension-normalizing, failure-absorbing wrapper around an `Embedder`.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    inner: Arc<dyn Embedder>,
    dimension: usize,
}

impl EmbeddingGenerator {
    pub fn new(inner: Arc<dyn Embedder>, dimension: usize) -> Self {
        Self { inner, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a text, always returning a vector of exactly `dimension`
    /// components. Shorter native vectors are zero-padded, longer ones
    /// truncated. Any capability failure yields a zero vector; the
    /// failure is logged and counted, never propagated.
    pub async fn embed(&self, text: &str, task: EmbedTask) -> Vec<f32> {
        if text.trim().is_empty() {
            tracing::warn!("Asked to embed empty text, returning zero vector");
            return vec![0.0; self.dimension];
        }

        match self.inner.embed(text, task).await {
            Ok(mut embedding) => {
                if embedding.len() != self.dimension {
                    tracing::warn!(
                        model = self.inner.model_name(),
                        native = embedding.len(),
                        target = self.dimension,
                        "Embedding dimension mismatch, padding/truncating"
                    );
                    embedding.resize(self.dimension, 0.0);
                }
                embedding
            }
            Err(e) => {
                tracing::error!(
                    model = self.inner.model_name(),
                    error = %e,
                    "Embedding failed, substituting zero vector"
                );
                metrics::counter!("tacforge_embedding_errors_total").increment(1);
                vec![0.0; self.dimension]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
            Err(AppError::EmbeddingError("unreachable".to_string()))
        }

        fn model_name(&self) -> &str {
            "failing-embedding"
        }
    }

    #[tokio::test]
    async fn test_mock_embedder_native_length() {
        let embedder = MockEmbedder::new(768);
        let embedding = embedder.embed("test text", EmbedTask::Document).await.unwrap();
        assert_eq!(embedding.len(), 768);
    }

    #[tokio::test]
    async fn test_generator_pads_short_vectors() {
        let generator = EmbeddingGenerator::new(Arc::new(MockEmbedder::new(8)), 16);
        let embedding = generator.embed("test", EmbedTask::Document).await;
        assert_eq!(embedding.len(), 16);
        assert_eq!(&embedding[8..], &[0.0; 8]);
    }

    #[tokio::test]
    async fn test_generator_truncates_long_vectors() {
        let generator = EmbeddingGenerator::new(Arc::new(MockEmbedder::new(32)), 16);
        let embedding = generator.embed("test", EmbedTask::Query).await;
        assert_eq!(embedding.len(), 16);
    }

    #[tokio::test]
    async fn test_generator_degrades_to_zero_vector_on_failure() {
        let generator = EmbeddingGenerator::new(Arc::new(FailingEmbedder), 16);
        let embedding = generator.embed("test", EmbedTask::Document).await;
        assert_eq!(embedding, vec![0.0; 16]);
    }

    #[tokio::test]
    async fn test_generator_zero_vector_for_empty_text() {
        let generator = EmbeddingGenerator::new(Arc::new(MockEmbedder::new(16)), 16);
        let embedding = generator.embed("   ", EmbedTask::Document).await;
        assert_eq!(embedding, vec![0.0; 16]);
    }

    #[test]
    fn test_task_type_hints() {
        assert_eq!(EmbedTask::Document.as_task_type(), "RETRIEVAL_DOCUMENT");
        assert_eq!(EmbedTask::Query.as_task_type(), "RETRIEVAL_QUERY");
    }
}
