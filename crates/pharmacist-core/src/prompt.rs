//! Grounded prompt composition.
//!
//! Prompts are plain strings assembled deterministically from the
//! preamble, the retrieved chunks (in retrieval order), the prior turns and
//! the new question:
//!
//! ```text
//! {preamble}
//!
//! Context:
//! {chunk 1}
//!
//! {chunk 2}
//!
//! Conversation so far:
//! User: ...
//! Assistant: ...
//!
//! Question: {question}
//! ```
//!
//! The `Conversation so far:` section is left out entirely when there is no
//! history.

use crate::models::{Chunk, ConversationTurn};

/// Instruction block placed at the top of every answer prompt.
pub const DEFAULT_PREAMBLE: &str = "You are an AI Thai language assistant and medicine expert.\n\
Answer based ONLY on the context below.\n\
If the context does not contain the answer, say that you do not know.";

/// Placeholder rendered when retrieval returned nothing.
const NO_CONTEXT: &str = "(no relevant context was found in the document)";

/// Builds answer and follow-up condensing prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBuilder {
    preamble: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE)
    }
}

impl PromptBuilder {
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into().trim_end().to_string(),
        }
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Compose the answer prompt.
    pub fn answer_prompt(
        &self,
        context: &[Chunk],
        history: &[ConversationTurn],
        question: &str,
    ) -> String {
        let mut prompt = String::with_capacity(
            self.preamble.len()
                + context.iter().map(|c| c.text.len() + 2).sum::<usize>()
                + question.len()
                + 64,
        );

        prompt.push_str(&self.preamble);
        prompt.push_str("\n\nContext:\n");
        if context.is_empty() {
            prompt.push_str(NO_CONTEXT);
        } else {
            let joined = context
                .iter()
                .map(|c| c.text.trim())
                .collect::<Vec<_>>()
                .join("\n\n");
            prompt.push_str(&joined);
        }

        if !history.is_empty() {
            prompt.push_str("\n\nConversation so far:\n");
            push_turns(&mut prompt, history);
        }

        prompt.push_str("\n\nQuestion: ");
        prompt.push_str(question.trim());
        prompt
    }

    /// Prompt asking the model to rewrite a follow-up as a standalone question.
    pub fn condense_prompt(&self, history: &[ConversationTurn], question: &str) -> String {
        let mut prompt = String::from(
            "Given the following conversation and a follow up question, rephrase the \
             follow up question to be a standalone question, in its original language.\n\n\
             Chat History:\n",
        );
        push_turns(&mut prompt, history);
        prompt.push_str("\nFollow Up Input: ");
        prompt.push_str(question.trim());
        prompt.push_str("\nStandalone question:");
        prompt
    }
}

fn push_turns(out: &mut String, turns: &[ConversationTurn]) {
    for turn in turns {
        out.push_str(turn.role.label());
        out.push_str(": ");
        out.push_str(turn.text.trim());
        out.push('\n');
    }
    // Drop the trailing newline; callers add their own spacing.
    if out.ends_with('\n') {
        out.pop();
    }
}
