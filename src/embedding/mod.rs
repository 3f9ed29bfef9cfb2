//! Embedding backends.
//!
//! Concrete [`EmbeddingBackend`] implementations selected by
//! `[embedding].provider`:
//!
//! | Config Value | Backend |
//! |--------------|---------|
//! | `"openai"` | [`OpenAiEmbedder`]: `POST /v1/embeddings` |
//! | `"ollama"` | [`OllamaEmbedder`]: `POST {url}/api/embed` |
//! | `"local"` | `LocalEmbedder`: on-device fastembed models (feature `local-embeddings`) |
//!
//! The HTTP backends batch natively and retry transient failures (see
//! [`crate::retry`]). All failures surface as [`Error::Embedding`].

#[cfg(feature = "local-embeddings")]
mod local;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use pharmacist_core::{EmbeddingBackend, Error};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::retry::{send_json, RetryPolicy};

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

// ============ OpenAI ============

/// Embedding backend using the OpenAI API.
///
/// Sends whole batches per request; vectors are returned in input order.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: Option<usize>,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    /// Create an OpenAI backend with an already-resolved API key.
    ///
    /// `[embedding].url`, when set, replaces the API endpoint (for
    /// OpenAI-compatible gateways).
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_EMBEDDINGS_URL.to_string()),
            api_key,
            model,
            dims: config.dims,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = send_json(&self.retry, "OpenAI", || {
            self.client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;

        parse_openai_response(&json)
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, text: &str) -> pharmacist_core::Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| Error::embedding(&self.model, "empty response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> pharmacist_core::Result<Vec<Vec<f32>>> {
        debug!(model = %self.model, count = texts.len(), "OpenAI embedding request");
        self.request(texts)
            .await
            .map_err(|e| Error::embedding(&self.model, format!("{e:#}")))
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, to_f32_vec(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedding backend using a local Ollama instance.
///
/// Requires Ollama to be running with an embedding model pulled (e.g.
/// `ollama pull bge-m3`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: Option<usize>,
    retry: RetryPolicy,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            model,
            dims: config.dims,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url);

        let json = send_json(&self.retry, "Ollama", || self.client.post(&endpoint).json(&body))
            .await
            .map_err(|e| anyhow!("{e:#} (is Ollama running at {}?)", self.url))?;

        parse_ollama_response(&json)
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, text: &str) -> pharmacist_core::Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| Error::embedding(&self.model, "empty response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> pharmacist_core::Result<Vec<Vec<f32>>> {
        debug!(model = %self.model, count = texts.len(), "Ollama embedding request");
        self.request(texts)
            .await
            .map_err(|e| Error::embedding(&self.model, format!("{e:#}")))
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            let values = embedding
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?;
            to_f32_vec(values)
        })
        .collect()
}

fn to_f32_vec(values: &[serde_json::Value]) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid embedding value: {}", v))
        })
        .collect()
}

/// Create the [`EmbeddingBackend`] named by `[embedding].provider`.
///
/// # Errors
///
/// Returns an error for unknown providers, missing model or API key, or
/// `local` without the `local-embeddings` feature.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config, config.api_key()?)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!(
            "Local embeddings are not available in this build. \
             Rebuild with `--features local-embeddings`."
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
