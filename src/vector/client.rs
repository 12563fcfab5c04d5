//! HTTP client wrapper for querying a Pinecone index.

use crate::config::Config;
use crate::upstream::{UpstreamError, format_endpoint, send_json};
use crate::vector::types::{QueryResponse, RetrievedPassage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "vector-index";

/// Nearest-neighbour lookup over the knowledge base.
#[async_trait]
pub trait VectorRetriever: Send + Sync {
    /// Return at most `top_k` passages ordered by descending relevance.
    ///
    /// An empty result is valid and means the knowledge base has nothing relevant.
    async fn search(&self, vector: Vec<f32>) -> Result<Vec<RetrievedPassage>, UpstreamError>;
}

/// Connection settings for a Pinecone index.
#[derive(Debug, Clone)]
pub struct PineconeSettings {
    /// Index host, e.g. `https://rd-consultant-kb-xxxx.svc.region.pinecone.io`.
    pub index_host: String,
    /// Value sent in the `Api-Key` header.
    pub api_key: String,
    /// Number of passages requested per query.
    pub top_k: usize,
    /// Per-call wall-clock budget.
    pub timeout: Duration,
}

impl PineconeSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            index_host: config.pinecone_index_host.clone().unwrap_or_default(),
            api_key: config.pinecone_api_key.clone().unwrap_or_default(),
            top_k: config.top_k,
            timeout: config.upstream_timeout(),
        }
    }
}

/// Lightweight HTTP client for Pinecone queries.
pub struct PineconeIndex {
    pub(crate) http: Client,
    pub(crate) settings: PineconeSettings,
}

impl PineconeIndex {
    /// Construct a client over a shared HTTP connection pool.
    pub fn with_client(http: Client, settings: PineconeSettings) -> Self {
        tracing::debug!(
            host = %settings.index_host,
            top_k = settings.top_k,
            has_api_key = !settings.api_key.is_empty(),
            "Initialized Pinecone HTTP client"
        );
        Self { http, settings }
    }
}

#[async_trait]
impl VectorRetriever for PineconeIndex {
    async fn search(&self, vector: Vec<f32>) -> Result<Vec<RetrievedPassage>, UpstreamError> {
        let top_k = self.settings.top_k;
        let request = self
            .http
            .post(format_endpoint(&self.settings.index_host, "query"))
            .header("Api-Key", &self.settings.api_key)
            .json(&json!({
                "vector": vector,
                "topK": top_k,
                "includeMetadata": true,
            }));

        let response: QueryResponse = send_json(SERVICE, self.settings.timeout, request).await?;
        let passages: Vec<RetrievedPassage> = response
            .matches
            .into_iter()
            .take(top_k)
            .map(RetrievedPassage::from)
            .collect();

        tracing::debug!(passages = passages.len(), top_k, "Vector index queried");
        Ok(passages)
    }
}
