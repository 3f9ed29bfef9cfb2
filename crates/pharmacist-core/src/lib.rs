//! # Pharmacist Core
//!
//! The retrieval-augmented question-answering pipeline behind the `rxa`
//! assistant: data models, chunking, the in-memory vector index,
//! retrieval, prompt composition and the conversation engine.
//!
//! This crate performs no filesystem or network I/O. Embedding and
//! generation providers plug in through the [`EmbeddingBackend`] and
//! [`GenerationBackend`] traits; the `pharmacist-assistant` crate supplies
//! HTTP and on-device implementations.
//!
//! ```text
//! Document ──split──▶ Vec<Chunk> ──VectorIndex::build──▶ VectorIndex
//!                                                           │
//! question ──ConversationEngine::ask──▶ Retriever ──query───┘
//!                 │
//!                 └──PromptBuilder──▶ GenerationBackend ──▶ answer
//! ```

pub mod chunk;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod prompt;
pub mod retriever;

pub use chunk::{split, ChunkingOptions};
pub use conversation::{ConversationEngine, EngineOptions, EngineState};
pub use embedding::EmbeddingBackend;
pub use error::{Error, Result};
pub use generation::GenerationBackend;
pub use index::{BuildOptions, VectorIndex};
pub use models::{Answer, Chunk, Document, RetrievalResult, ScoredChunk};
pub use prompt::PromptBuilder;
pub use retriever::Retriever;
