use crate::config::Config;
use crate::upstream::{UpstreamError, format_endpoint, send_json};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "embedding";

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce the embedding vector for a single piece of text.
    ///
    /// Callers filter out blank input; implementations do not validate it.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;
}

/// Connection settings for the OpenAI embeddings endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Embedding model identifier.
    pub model: String,
    /// Expected vector length.
    pub dimension: usize,
    /// Per-call wall-clock budget.
    pub timeout: Duration,
}

impl EmbeddingSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.openai_base_url.clone(),
            api_key: config.openai_api_key.clone().unwrap_or_default(),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
            timeout: config.upstream_timeout(),
        }
    }
}

/// Embedding client backed by the OpenAI `/embeddings` endpoint.
pub struct OpenAiEmbeddingClient {
    http: Client,
    settings: EmbeddingSettings,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    /// Construct a client over a shared HTTP connection pool.
    pub fn with_client(http: Client, settings: EmbeddingSettings) -> Self {
        tracing::debug!(
            model = %settings.model,
            dimension = settings.dimension,
            "Initialized embedding client"
        );
        Self { http, settings }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let request = self
            .http
            .post(format_endpoint(&self.settings.base_url, "embeddings"))
            .bearer_auth(&self.settings.api_key)
            .json(&json!({
                "model": self.settings.model,
                "input": text,
            }));

        let body: EmbeddingResponse = send_json(SERVICE, self.settings.timeout, request).await?;
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| UpstreamError::malformed(SERVICE, "response contained no embeddings"))?;

        if vector.len() != self.settings.dimension {
            return Err(UpstreamError::malformed(
                SERVICE,
                format!(
                    "expected {} dimensions, got {}",
                    self.settings.dimension,
                    vector.len()
                ),
            ));
        }

        tracing::debug!(dimension = vector.len(), "Query embedded");
        Ok(vector)
    }
}
