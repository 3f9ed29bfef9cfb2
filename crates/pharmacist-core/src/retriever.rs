//! Question-to-context retrieval.
//!
//! A [`Retriever`] pins the embedder and `k` used against a built
//! [`VectorIndex`], so callers only pass the question.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::EmbeddingBackend;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::models::{Chunk, RetrievalResult};

/// Retrieves the top-k chunks for a question.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingBackend>,
    top_k: usize,
    min_score: Option<f32>,
}

impl Retriever {
    /// Create a retriever over `index` that embeds questions with `embedder`.
    ///
    /// `embedder` must be the backend the index was built with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `top_k == 0`.
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingBackend>,
        top_k: usize,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be >= 1".to_string()));
        }
        Ok(Self {
            index,
            embedder,
            top_k,
            min_score: None,
        })
    }

    /// Drop results scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Ranked chunks with scores, at most `top_k`, descending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Retrieval`] if embedding the question fails.
    pub async fn retrieve_scored(&self, question: &str) -> Result<RetrievalResult> {
        let mut results = self
            .index
            .query(question, self.embedder.as_ref(), self.top_k)
            .await
            .map_err(|e| match e {
                Error::Embedding { .. } => Error::Retrieval(e.to_string()),
                other => other,
            })?;

        if let Some(min) = self.min_score {
            results.retain(|r| r.score >= min);
        }

        debug!(
            k = self.top_k,
            hits = results.len(),
            top_score = results.first().map(|r| r.score),
            "retrieved context"
        );
        Ok(results)
    }

    /// Ranked chunks with scores dropped, order preserved.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_scored(question)
            .await?
            .into_iter()
            .map(|r| r.chunk)
            .collect())
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("chunks", &self.index.len())
            .field("embedder", &self.embedder.model_name())
            .field("top_k", &self.top_k)
            .field("min_score", &self.min_score)
            .finish()
    }
}
