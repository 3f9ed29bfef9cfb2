//! Conversational question answering over a [`Retriever`].
//!
//! The [`ConversationEngine`] owns the session history and serializes
//! requests: at most one `ask` or `reset` runs at a time, and a concurrent
//! call is rejected with [`Error::Busy`] instead of waiting.
//!
//! # Turn lifecycle
//!
//! ```text
//! ask(question)
//!   ├── blank?                      → EmptyInput (no state change)
//!   ├── lock session (try_lock)     → Busy if another request holds it
//!   ├── condense follow-up          (opt-in, only with prior turns)
//!   ├── retrieve context            → Retrieval error, history untouched
//!   ├── compose prompt
//!   ├── generate                    → Generation error, history untouched
//!   └── append (user, assistant), unlock
//! ```
//!
//! History is only written after generation succeeds, and the lock guard
//! is released on every exit path. Dropping an in-flight `ask` future
//! therefore leaves the engine idle with its history unchanged.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::generation::GenerationBackend;
use crate::models::{Answer, ConversationTurn, Role};
use crate::prompt::PromptBuilder;
use crate::retriever::Retriever;

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Ready for `ask` or `reset`.
    Idle,
    /// A request is in flight.
    Generating,
}

/// Ordered, append-only record of the session's turns.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn record(&mut self, question: &str, answer: &str) {
        self.turns.push(ConversationTurn {
            role: Role::User,
            text: question.to_string(),
        });
        self.turns.push(ConversationTurn {
            role: Role::Assistant,
            text: answer.to_string(),
        });
    }

    fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Generation settings for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Token budget passed to every `generate` call.
    pub max_tokens: u32,
    /// Rewrite follow-up questions into standalone ones before retrieval.
    pub condense_follow_ups: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            condense_follow_ups: false,
        }
    }
}

/// Single-session grounded chat engine.
pub struct ConversationEngine {
    retriever: Retriever,
    generator: Arc<dyn GenerationBackend>,
    prompts: PromptBuilder,
    options: EngineOptions,
    session: Mutex<ConversationHistory>,
}

impl ConversationEngine {
    /// Create an engine with an empty history, the default preamble and
    /// default [`EngineOptions`].
    pub fn new(retriever: Retriever, generator: Arc<dyn GenerationBackend>) -> Self {
        Self {
            retriever,
            generator,
            prompts: PromptBuilder::default(),
            options: EngineOptions::default(),
            session: Mutex::new(ConversationHistory::default()),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer `question`, returning only the answer text.
    ///
    /// See [`ask_detailed`](Self::ask_detailed) for the error contract.
    pub async fn ask(&self, question: &str) -> Result<String> {
        Ok(self.ask_detailed(question).await?.text)
    }

    /// Answer `question`, returning the answer and the chunks it was
    /// grounded on.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyInput`] for a blank question.
    /// - [`Error::Busy`] if another request is in flight.
    /// - [`Error::Retrieval`] if context retrieval fails.
    /// - [`Error::Generation`] if the backend fails or returns nothing.
    ///
    /// History is unchanged on every error.
    pub async fn ask_detailed(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mut history = self.session.try_lock().map_err(|_| Error::Busy)?;
        debug!(prior_turns = history.len(), "answering question");

        let search_query = if self.options.condense_follow_ups && !history.is_empty() {
            self.condense(&history, question).await?
        } else {
            question.to_string()
        };

        let sources = self
            .retriever
            .retrieve(&search_query)
            .await
            .map_err(|e| match e {
                Error::Retrieval(_) => e,
                other => Error::Retrieval(other.to_string()),
            })?;

        let prompt = self
            .prompts
            .answer_prompt(&sources, history.turns(), question);

        let text = self.generate(&prompt).await?;

        history.record(question, &text);
        info!(
            sources = sources.len(),
            turns = history.len(),
            answer_chars = text.chars().count(),
            "answered question"
        );

        Ok(Answer { text, sources })
    }

    /// Clear the history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if a request is in flight.
    pub fn reset(&self) -> Result<()> {
        let mut history = self.session.try_lock().map_err(|_| Error::Busy)?;
        history.clear();
        debug!("conversation reset");
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        match self.session.try_lock() {
            Ok(_) => EngineState::Idle,
            Err(_) => EngineState::Generating,
        }
    }

    /// Number of recorded turns (user and assistant messages).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if a request is in flight.
    pub fn turn_count(&self) -> Result<usize> {
        let history = self.session.try_lock().map_err(|_| Error::Busy)?;
        Ok(history.len())
    }

    async fn condense(&self, history: &ConversationHistory, question: &str) -> Result<String> {
        let prompt = self.prompts.condense_prompt(history.turns(), question);
        match self.generate(&prompt).await {
            Ok(standalone) => {
                debug!(standalone = %standalone, "condensed follow-up question");
                Ok(standalone)
            }
            Err(e) => {
                warn!(error = %e, "failed to condense follow-up question");
                Err(e)
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let provider = self.generator.model_name();
        let text = self
            .generator
            .generate(prompt, self.options.max_tokens)
            .await
            .map_err(|e| match e {
                Error::Generation { .. } => e,
                other => Error::generation(provider, other.to_string()),
            })?;

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::generation(provider, "backend returned an empty completion"));
        }
        Ok(text.to_string())
    }
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("retriever", &self.retriever)
            .field("generator", &self.generator.model_name())
            .field("options", &self.options)
            .field("state", &self.state())
            .finish()
    }
}
