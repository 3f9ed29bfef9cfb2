//! Embedding backend trait and vector utilities.
//!
//! Defines the [`EmbeddingBackend`] trait that all embedding providers
//! implement, plus the similarity function the index ranks by.
//!
//! Concrete providers (OpenAI, Ollama, fastembed) live in the
//! `pharmacist-assistant` app crate.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that maps text to a fixed-dimension vector.
///
/// The same backend (and model) must be used to build an index and to
/// query it, otherwise similarity scores are meaningless. The index does
/// not check this.
///
/// The default [`embed_batch`](EmbeddingBackend::embed_batch) calls
/// [`embed`](EmbeddingBackend::embed) sequentially; providers with a
/// native batch endpoint should override it.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the vector dimensionality, if known before the first call.
    fn dims(&self) -> Option<usize> {
        None
    }

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
