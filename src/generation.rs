//! Text-generation backends.
//!
//! | Config Value | Backend |
//! |--------------|---------|
//! | `"anthropic"` | [`AnthropicGenerator`]: Messages API |
//! | `"ollama"` | [`OllamaGenerator`]: `POST {url}/api/generate`, non-streaming |
//!
//! Both retry transient failures (see [`crate::retry`]) and report
//! terminal failures and empty completions as [`Error::Generation`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use pharmacist_core::{Error, GenerationBackend};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::retry::{send_json, RetryPolicy};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

// ============ Anthropic ============

/// Generation backend using the Anthropic Messages API.
///
/// The whole grounded prompt is sent as a single user message.
pub struct AnthropicGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl AnthropicGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config
                .url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_MESSAGES_URL.to_string()),
            api_key,
            model: config.model().to_string(),
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    async fn request(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        let json = send_json(&self.retry, "Anthropic", || {
            self.client
                .post(&self.endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
        })
        .await?;

        parse_anthropic_response(&json)
    }
}

#[async_trait]
impl GenerationBackend for AnthropicGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> pharmacist_core::Result<String> {
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), max_tokens, "Anthropic request");
        self.request(prompt, max_tokens)
            .await
            .map_err(|e| Error::generation(&self.model, format!("{e:#}")))
    }
}

/// Concatenate the `text` blocks of a Messages API response.
fn parse_anthropic_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow!("Invalid Anthropic response: missing content array"))?;

    let text: String = content
        .iter()
        .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        bail!("Anthropic returned an empty completion");
    }
    Ok(text)
}

// ============ Ollama ============

/// Generation backend using a local Ollama instance.
pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    retry: RetryPolicy,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            model: config.model().to_string(),
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    async fn request(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "num_predict": max_tokens },
        });
        let endpoint = format!("{}/api/generate", self.url);

        let json = send_json(&self.retry, "Ollama", || self.client.post(&endpoint).json(&body))
            .await
            .map_err(|e| anyhow!("{e:#} (is Ollama running at {}?)", self.url))?;

        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing response field"))?;
        if text.trim().is_empty() {
            bail!("Ollama returned an empty completion");
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> pharmacist_core::Result<String> {
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), max_tokens, "Ollama request");
        self.request(prompt, max_tokens)
            .await
            .map_err(|e| Error::generation(&self.model, format!("{e:#}")))
    }
}

/// Create the [`GenerationBackend`] named by `[generation].provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationBackend>> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicGenerator::new(config, config.api_key()?)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
