//! Interactive chat shell.
//!
//! Reads one question per line and prints the grounded answer. Lines that
//! start with `/` are shell commands:
//!
//! | Input | Effect |
//! |-------|--------|
//! | `q`, `quit`, `exit` | leave the shell |
//! | `/reset` | clear the conversation history |
//! | `/sources` | toggle printing of source chunks under each answer |
//! | `/help` | list commands |
//!
//! Per-question failures are printed and the loop continues; a fatal error
//! ends the session. Ctrl-C while an answer is being generated cancels that
//! question only; at the prompt it ends the session.

use std::io::Write;

use anyhow::Result;
use pharmacist_core::{Answer, ConversationEngine, ScoredChunk};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

const HELP: &str = "Commands: /reset (new conversation), /sources (toggle sources), q (quit). \
Ctrl-C cancels the current answer, or quits at the prompt.";

/// Maximum characters of a chunk shown in source listings.
const PREVIEW_CHARS: usize = 120;

#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Quit,
    Reset,
    ToggleSources,
    Help,
    Empty,
    Unknown(&'a str),
    Question(&'a str),
}

pub fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "q" | "quit" | "exit" => Input::Quit,
        "/reset" => Input::Reset,
        "/sources" => Input::ToggleSources,
        "/help" | "?" => Input::Help,
        cmd if cmd.starts_with('/') => Input::Unknown(cmd),
        question => Input::Question(question),
    }
}

/// Interrupt requests delivered to the chat loop.
///
/// Installing a Ctrl-C listener replaces the default SIGINT behaviour for
/// the rest of the process, so a single listener feeds every wait in the
/// loop.
pub struct Interrupts {
    rx: mpsc::UnboundedReceiver<()>,
}

impl Interrupts {
    /// Interrupts raised by Ctrl-C.
    pub fn ctrl_c() -> Self {
        let (tx, interrupts) = Self::channel();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
        interrupts
    }

    /// Interrupts raised by sending on the returned handle.
    pub fn channel() -> (mpsc::UnboundedSender<()>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next interrupt. Never resolves once every sender is gone.
    async fn next(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run the chat loop until the input ends, the user quits, or an interrupt
/// arrives at the prompt.
pub async fn run_chat<R, W>(
    engine: &ConversationEngine,
    input: R,
    out: &mut W,
    interactive: bool,
    interrupts: &mut Interrupts,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let session_id = Uuid::new_v4();
    info!(%session_id, "chat session started");

    let mut show_sources = false;
    let mut lines = input.lines();
    let mut questions = 0usize;

    loop {
        if interactive {
            write!(out, "> ")?;
            out.flush()?;
        }
        let line = tokio::select! {
            biased;
            line = lines.next_line() => line?,
            _ = interrupts.next() => {
                debug!(%session_id, "interrupted at prompt");
                writeln!(out)?;
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Help => writeln!(out, "{HELP}")?,
            Input::Unknown(cmd) => writeln!(out, "Unknown command: {cmd}. {HELP}")?,
            Input::ToggleSources => {
                show_sources = !show_sources;
                writeln!(out, "Sources {}.", if show_sources { "on" } else { "off" })?;
            }
            Input::Reset => match engine.reset() {
                Ok(()) => writeln!(out, "Conversation cleared.")?,
                Err(e) => writeln!(out, "Error: {e}")?,
            },
            Input::Question(question) => {
                questions += 1;
                let outcome = tokio::select! {
                    result = engine.ask_detailed(question) => Some(result),
                    _ = interrupts.next() => None,
                };
                match outcome {
                    None => writeln!(out, "(cancelled)")?,
                    Some(Ok(answer)) => {
                        writeln!(out, "{}", render_answer(&answer, show_sources))?;
                    }
                    Some(Err(e)) if e.is_fatal() => return Err(e.into()),
                    Some(Err(e)) => writeln!(out, "Error: {e}")?,
                }
            }
        }
    }

    info!(%session_id, questions, "chat session ended");
    Ok(())
}

/// Answer text, optionally followed by the grounding chunks.
pub fn render_answer(answer: &Answer, show_sources: bool) -> String {
    let mut out = answer.text.clone();
    if show_sources && !answer.sources.is_empty() {
        out.push_str("\n\nSources:");
        for (i, chunk) in answer.sources.iter().enumerate() {
            out.push_str(&format!(
                "\n  [{}] chunk #{} (byte {}): {}",
                i + 1,
                chunk.sequence_index,
                chunk.start_offset,
                preview(&chunk.text)
            ));
        }
    }
    out
}

/// Ranked retrieval results for `rxa search`.
pub fn render_results(results: &[ScoredChunk]) -> String {
    if results.is_empty() {
        return "No results.".to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. [{:.3}] chunk #{} (byte {})\n   {}",
                i + 1,
                r.score,
                r.chunk.sequence_index,
                r.chunk.start_offset,
                preview(&r.chunk.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single-line preview, truncated on a character boundary.
pub fn preview(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}…")
}
