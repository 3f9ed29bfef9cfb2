//! Brute-force in-memory vector index.
//!
//! The index is built once from the full chunk list and is read-only
//! afterwards, so it can be shared behind an `Arc` without locking.
//! Queries scan every entry (O(chunks)); the corpus is a single bounded
//! document. An approximate nearest-neighbour structure could replace the
//! scan behind the same [`VectorIndex::query`] signature.
//!
//! # Build
//!
//! Chunk texts are embedded in batches of [`BuildOptions::batch_size`],
//! with up to [`BuildOptions::concurrency`] batches in flight. Results are
//! reassembled in chunk order. Any failure aborts the build and no index
//! value is produced.

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::embedding::{cosine_similarity, EmbeddingBackend};
use crate::error::{Error, Result};
use crate::models::{Chunk, EmbeddedChunk, RetrievalResult, ScoredChunk};

/// Tuning for [`VectorIndex::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Texts per embedder call.
    pub batch_size: usize,
    /// Maximum embedder calls in flight.
    pub concurrency: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            concurrency: 4,
        }
    }
}

/// Append-only set of embedded chunks with top-k cosine search.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Vec<EmbeddedChunk>,
    dims: usize,
}

impl VectorIndex {
    /// Embed every chunk and build the index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Embedding`] if the embedder fails for any batch,
    /// returns the wrong number of vectors, returns empty or non-finite
    /// vectors, or vectors whose dimensionality is inconsistent (with each
    /// other or with [`EmbeddingBackend::dims`]).
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingBackend,
        options: &BuildOptions,
    ) -> Result<Self> {
        let provider = embedder.model_name().to_string();
        let batch_size = options.batch_size.max(1);
        let concurrency = options.concurrency.max(1);

        let batches: Vec<Vec<String>> = chunks
            .chunks(batch_size)
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();
        let batch_count = batches.len();

        let vectors: Vec<Vec<Vec<f32>>> = stream::iter(batches.into_iter().enumerate())
            .map(|(n, texts)| {
                let provider = provider.as_str();
                async move {
                    debug!(batch = n, size = texts.len(), "embedding batch");
                    let out = embedder
                        .embed_batch(&texts)
                        .await
                        .map_err(|e| as_embedding_error(provider, e))?;
                    if out.len() != texts.len() {
                        return Err(Error::embedding(
                            provider,
                            format!(
                                "batch {n}: expected {} vectors, got {}",
                                texts.len(),
                                out.len()
                            ),
                        ));
                    }
                    Ok(out)
                }
            })
            .buffered(concurrency)
            .try_collect()
            .await?;

        let mut dims = embedder.dims();
        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.into_iter().zip(vectors.into_iter().flatten()) {
            check_vector(&provider, &vector, dims)?;
            dims.get_or_insert(vector.len());
            entries.push(EmbeddedChunk { chunk, vector });
        }

        let dims = dims.unwrap_or(0);
        info!(
            model = %provider,
            chunk_count = entries.len(),
            batches = batch_count,
            dims,
            "vector index built"
        );

        Ok(Self { entries, dims })
    }

    /// Embed `text` and return the `k` most similar chunks.
    ///
    /// Results are sorted by descending cosine similarity; ties keep
    /// insertion order. If `k` exceeds the number of entries, all entries
    /// are returned.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `k == 0`.
    /// - [`Error::Embedding`] if the embedder fails or returns a vector of
    ///   the wrong dimensionality.
    pub async fn query(
        &self,
        text: &str,
        embedder: &dyn EmbeddingBackend,
        k: usize,
    ) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be >= 1".to_string()));
        }
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let provider = embedder.model_name();
        let query_vec = embedder
            .embed(text)
            .await
            .map_err(|e| as_embedding_error(provider, e))?;
        check_vector(provider, &query_vec, Some(self.dims))?;

        Ok(self.search_vector(&query_vec, k))
    }

    /// Rank entries against an already-embedded query vector.
    pub fn search_vector(&self, query_vec: &[f32], k: usize) -> RetrievalResult {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query_vec, &e.vector),
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimensionality (0 for an empty index built without declared dims).
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Indexed chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

fn as_embedding_error(provider: &str, err: Error) -> Error {
    match err {
        Error::Embedding { .. } => err,
        other => Error::embedding(provider, other.to_string()),
    }
}

fn check_vector(provider: &str, vector: &[f32], expected: Option<usize>) -> Result<()> {
    if vector.is_empty() {
        return Err(Error::embedding(provider, "backend returned an empty vector"));
    }
    if let Some(dims) = expected {
        if vector.len() != dims {
            return Err(Error::embedding(
                provider,
                format!("dimension mismatch: expected {dims}, got {}", vector.len()),
            ));
        }
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::embedding(provider, "vector contains non-finite values"));
    }
    Ok(())
}
