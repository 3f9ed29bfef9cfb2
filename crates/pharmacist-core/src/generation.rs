//! Text-generation backend trait.
//!
//! Concrete providers (Anthropic, Ollama) live in the app crate; tests use
//! in-process fakes.

use async_trait::async_trait;

use crate::error::Result;

/// Any text-generation model: given a prompt, return a completion.
///
/// Implementations own their transport concerns (timeouts, retries) and
/// report terminal failures as [`Error::Generation`](crate::error::Error::Generation).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"claude-3-5-sonnet-20240620"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`, producing at most `max_tokens` tokens.
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}
