//! Error taxonomy for the question-answering pipeline.
//!
//! Errors fall into two classes that the shell must tell apart:
//!
//! | Class | Variants | Shell behaviour |
//! |-------|----------|-----------------|
//! | Fatal | [`Ingestion`](Error::Ingestion), [`Embedding`](Error::Embedding), [`Config`](Error::Config) | abort startup, restart required |
//! | Per-question | [`Generation`](Error::Generation), [`Retrieval`](Error::Retrieval), [`EmptyInput`](Error::EmptyInput), [`Busy`](Error::Busy), [`InvalidArgument`](Error::InvalidArgument) | report and keep the session |
//!
//! Use [`Error::is_fatal`] rather than matching on variants.

use thiserror::Error;

/// Errors produced by the pipeline and its backends.
#[derive(Debug, Error)]
pub enum Error {
    /// The source document is missing, unreadable, or in an unsupported format.
    #[error("Ingestion error ({source_id}): {message}")]
    Ingestion {
        /// Path or identifier of the document being loaded.
        source_id: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding backend failed or returned malformed vectors.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation backend failed (after its retry policy was exhausted).
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generation backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Retrieving grounding context for a question failed.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// The question was empty or whitespace-only.
    #[error("Question must not be empty")]
    EmptyInput,

    /// Another request is already in flight on this session.
    #[error("A question is already being answered; try again when it completes")]
    Busy,

    /// A caller-supplied argument is out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Convenience constructor for [`Error::Ingestion`].
    pub fn ingestion(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ingestion {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Embedding`].
    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Embedding {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Generation`].
    pub fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Returns `true` when the process cannot continue without a restart.
    ///
    /// Embedding errors are fatal because they only escape during index
    /// build; query-time embedding failures surface as [`Error::Retrieval`].
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Ingestion { .. } | Error::Embedding { .. } | Error::Config(_)
        )
    }
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(Error::ingestion("a.pdf", "missing").is_fatal());
        assert!(Error::embedding("openai", "401").is_fatal());
        assert!(Error::Config("bad".into()).is_fatal());

        assert!(!Error::generation("anthropic", "timeout").is_fatal());
        assert!(!Error::Retrieval("boom".into()).is_fatal());
        assert!(!Error::EmptyInput.is_fatal());
        assert!(!Error::Busy.is_fatal());
        assert!(!Error::InvalidArgument("k".into()).is_fatal());
    }

    #[test]
    fn display_includes_provider() {
        let err = Error::generation("anthropic", "HTTP 529");
        assert_eq!(err.to_string(), "Generation error (anthropic): HTTP 529");
    }
}
