//! Startup pipeline orchestration.
//!
//! Runs the one-time ingestion flow: load document → split into chunks →
//! embed into a [`VectorIndex`] → wire up the [`ConversationEngine`].
//! The caller sees a single operation that either fully succeeds or fails;
//! any failure here is fatal and requires a restart.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use pharmacist_core::chunk;
use pharmacist_core::conversation::{ConversationEngine, EngineOptions};
use pharmacist_core::index::VectorIndex;
use pharmacist_core::prompt::PromptBuilder;
use pharmacist_core::{Chunk, Document, Retriever};
use tracing::info;

use crate::config::Config;
use crate::document;
use crate::embedding::create_embedder;
use crate::generation::create_generator;

/// A ready-to-use question-answering session.
pub struct Session {
    pub document: Document,
    pub chunk_count: usize,
    pub engine: ConversationEngine,
}

/// Load the configured document and split it into chunks. No backend calls.
pub fn load_and_split(config: &Config) -> Result<(Document, Vec<Chunk>)> {
    let document = document::load(&config.document.path)?;
    let chunks = chunk::split(&document, &config.chunking.options())?;
    Ok((document, chunks))
}

/// Build the retriever: load, split, embed.
pub async fn build_retriever(config: &Config) -> Result<(Document, usize, Retriever)> {
    let started = Instant::now();
    let (document, chunks) = load_and_split(config)?;
    let chunk_count = chunks.len();

    let embedder = create_embedder(&config.embedding)
        .context("Failed to initialize embedding backend")?;
    let index = VectorIndex::build(chunks, embedder.as_ref(), &config.embedding.build_options())
        .await?;

    let retriever = Retriever::new(Arc::new(index), embedder, config.retrieval.top_k)?
        .with_min_score(config.retrieval.min_score);

    info!(
        document.id = %document.id,
        chunk_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index ready"
    );
    Ok((document, chunk_count, retriever))
}

/// Build the full session: retriever plus generation backend and prompt
/// settings.
pub async fn build_session(config: &Config) -> Result<Session> {
    let (document, chunk_count, retriever) = build_retriever(config).await?;

    let generator = create_generator(&config.generation)
        .context("Failed to initialize generation backend")?;

    let engine = ConversationEngine::new(retriever, generator)
        .with_prompts(PromptBuilder::new(config.prompt.preamble.clone()))
        .with_options(EngineOptions {
            max_tokens: config.generation.max_tokens,
            condense_follow_ups: config.prompt.condense_follow_ups,
        });

    Ok(Session {
        document,
        chunk_count,
        engine,
    })
}
