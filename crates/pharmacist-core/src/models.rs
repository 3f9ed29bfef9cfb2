//! Core data models used throughout the pipeline.
//!
//! These types represent the document, its chunks, retrieval results, and
//! the conversation turns that flow through ingestion and answering.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A loaded source document. Immutable once constructed.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Source identifier (the path as given on the command line or in config).
    pub id: String,
    /// Content type the text was extracted from (e.g. `application/pdf`).
    pub content_type: String,
    /// Number of pages, when the format exposes them.
    pub page_count: Option<usize>,
    /// SHA-256 of the extracted text, hex encoded.
    pub content_hash: String,
    /// When the document was loaded.
    pub loaded_at: DateTime<Utc>,
    /// Extracted plain text.
    pub text: String,
}

/// A bounded, contiguous slice of a [`Document`]'s text.
///
/// `text` is exactly `document.text[start_offset..start_offset + text.len()]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// The parent document's [`Document::id`].
    pub source_id: String,
    /// Position of this chunk in the document, contiguous from 0.
    pub sequence_index: usize,
    /// Byte offset of the chunk within the document text.
    pub start_offset: usize,
    pub text: String,
}

impl Chunk {
    /// Byte offset one past the end of this chunk in the document text.
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.text.len()
    }

    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A [`Chunk`] paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query, in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Ranked retrieval output: at most `k` entries, descending by score.
pub type RetrievalResult = Vec<ScoredChunk>;

/// Speaker of a [`ConversationTurn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when rendering the turn into a prompt.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

/// A generated answer together with the chunks it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// Grounding chunks in retrieval order.
    pub sources: Vec<Chunk>,
}
