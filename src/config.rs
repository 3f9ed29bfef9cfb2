//! Configuration parsing and validation.
//!
//! The assistant is configured through a single TOML file (default
//! `./config/rxa.toml`). Every section except `[document]` and
//! `[embedding]` may be omitted and falls back to the defaults below.
//!
//! Credentials are never read from ambient state by the backends: they are
//! resolved once here ([`EmbeddingConfig::api_key`],
//! [`GenerationConfig::api_key`]) and passed to constructors.
//!
//! # Example
//!
//! ```toml
//! [document]
//! path = "data/medicines.pdf"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 0
//!
//! [retrieval]
//! top_k = 3
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "anthropic"
//! model = "claude-3-5-sonnet-20240620"
//! max_tokens = 1024
//! ```

use anyhow::{bail, Context, Result};
use pharmacist_core::chunk::ChunkingOptions;
use pharmacist_core::index::BuildOptions;
use pharmacist_core::prompt::DEFAULT_PREAMBLE;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub document: DocumentConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentConfig {
    /// Source document (`.pdf`, `.docx`, `.txt` or `.md`).
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_overlap: usize,
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: 0,
            separator: default_separator(),
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkingOptions {
        ChunkingOptions::new(self.chunk_size, self.chunk_overlap)
            .with_separator(self.separator.clone())
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_separator() -> String {
    "\n\n".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai`, `ollama` or `local`.
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Inline key; takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    /// Ollama base URL, or a replacement OpenAI endpoint.
    #[serde(default)]
    pub url: Option<String>,
}

impl EmbeddingConfig {
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
        }
    }

    /// Resolve the API key from the config file or the named environment variable.
    pub fn api_key(&self) -> Result<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env, "embedding")
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_concurrency() -> usize {
    4
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `anthropic` or `ollama`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    /// Required for `ollama`; `anthropic` falls back to
    /// `claude-3-5-sonnet-20240620`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            max_tokens: default_max_tokens(),
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout(),
            api_key: None,
            api_key_env: default_anthropic_key_env(),
            url: None,
        }
    }
}

impl GenerationConfig {
    /// The configured model, or the Anthropic default.
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_ANTHROPIC_MODEL)
    }

    pub fn api_key(&self) -> Result<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env, "generation")
    }
}

fn default_generation_provider() -> String {
    "anthropic".to_string()
}
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20240620";
fn default_max_tokens() -> u32 {
    1024
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_preamble")]
    pub preamble: String,
    #[serde(default)]
    pub condense_follow_ups: bool,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            preamble: default_preamble(),
            condense_follow_ups: false,
        }
    }
}

fn default_preamble() -> String {
    DEFAULT_PREAMBLE.to_string()
}

fn resolve_key(inline: Option<&str>, env_var: &str, section: &str) -> Result<String> {
    if let Some(key) = inline.filter(|k| !k.trim().is_empty()) {
        return Ok(key.to_string());
    }
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!(
            "{} API key not found: set {}.api_key or the {} environment variable",
            section,
            section,
            env_var
        ),
    }
}

/// Read, parse and validate the configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    config
        .chunking
        .options()
        .validate()
        .map_err(|e| anyhow::anyhow!("chunking: {e}"))?;

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if let Some(min) = config.retrieval.min_score {
        if !(-1.0..=1.0).contains(&min) {
            bail!("retrieval.min_score must be in [-1.0, 1.0]");
        }
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "openai" | "ollama" => {
            if embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
        }
        "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
            other
        ),
    }
    if embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if embedding.concurrency == 0 {
        bail!("embedding.concurrency must be > 0");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "anthropic" => {}
        "ollama" => {
            if config.generation.model.is_none() {
                bail!("generation.model must be specified when provider is 'ollama'");
            }
        }
        other => bail!(
            "Unknown generation provider: '{}'. Must be anthropic or ollama.",
            other
        ),
    }
    if config.generation.max_tokens == 0 {
        bail!("generation.max_tokens must be > 0");
    }
    if config.generation.model().trim().is_empty() {
        bail!("generation.model must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[document]
path = "data/medicines.pdf"

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536
"#;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 0);
        assert_eq!(config.chunking.separator, "\n\n");
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.embedding.concurrency, 4);
        assert_eq!(config.generation.provider, "anthropic");
        assert_eq!(config.generation.model(), "claude-3-5-sonnet-20240620");
        assert_eq!(config.generation.max_tokens, 1024);
        assert_eq!(config.prompt.preamble, DEFAULT_PREAMBLE);
        assert!(!config.prompt.condense_follow_ups);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let file = write_config(&format!(
            "{MINIMAL}\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n"
        ));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn rejects_zero_top_k() {
        let file = write_config(&format!("{MINIMAL}\n[retrieval]\ntop_k = 0\n"));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn rejects_unknown_providers() {
        let file = write_config(&MINIMAL.replace("\"openai\"", "\"cohere\""));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));

        let file = write_config(&format!("{MINIMAL}\n[generation]\nprovider = \"palm\"\n"));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown generation provider"));
    }

    #[test]
    fn openai_requires_model() {
        let file = write_config(&MINIMAL.replace("model = \"text-embedding-3-small\"\n", ""));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn ollama_generation_requires_model() {
        let file = write_config(&format!("{MINIMAL}\n[generation]\nprovider = \"ollama\"\n"));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("generation.model"));

        let file = write_config(&format!(
            "{MINIMAL}\n[generation]\nprovider = \"ollama\"\nmodel = \"llama3\"\n"
        ));
        assert_eq!(load_config(file.path()).unwrap().generation.model(), "llama3");
    }

    #[test]
    fn example_config_is_valid() {
        let config: Config = toml::from_str(include_str!("../config/rxa.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.prompt.preamble, DEFAULT_PREAMBLE);
        assert_eq!(config.embedding.provider, "openai");
    }

    #[test]
    fn missing_file_has_context() {
        let err = load_config(Path::new("/nonexistent/rxa.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn inline_key_wins_over_env() {
        let file = write_config(&format!(
            "{MINIMAL}api_key = \"sk-inline\"\napi_key_env = \"RXA_TEST_UNSET_KEY\"\n"
        ));
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.embedding.api_key().unwrap(), "sk-inline");
        assert_eq!(config.generation.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn missing_key_names_env_var() {
        let file = write_config(&format!(
            "{MINIMAL}api_key_env = \"RXA_TEST_DEFINITELY_UNSET\"\n"
        ));
        let config = load_config(file.path()).unwrap();
        let err = config.embedding.api_key().unwrap_err();
        assert!(err.to_string().contains("RXA_TEST_DEFINITELY_UNSET"));
    }
}
