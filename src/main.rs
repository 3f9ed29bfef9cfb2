//! # Pharmacist Assistant CLI (`rxa`)
//!
//! Answers questions about one medicine reference document. The document
//! is loaded, chunked and embedded at every start; nothing is persisted.
//!
//! ## Usage
//!
//! ```bash
//! rxa --config ./config/rxa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rxa chat` | Interactive chat (default) |
//! | `rxa ask "<question>"` | One-shot question |
//! | `rxa search "<query>"` | Retrieval only: ranked chunks with scores |
//! | `rxa chunks` | Load and split the document; no backend calls |
//!
//! ## Examples
//!
//! ```bash
//! # Chat about the configured document
//! rxa chat --config ./config/rxa.toml
//!
//! # Ask about a different document
//! rxa ask "ยาพาราเซตามอลใช้ทำอะไร" --document ./data/leaflet.pdf --sources
//!
//! # Check chunking before spending embedding calls
//! rxa chunks --full
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::error;
use tracing_subscriber::EnvFilter;

use pharmacist_assistant::chat::{render_answer, render_results, run_chat, Interrupts};
use pharmacist_assistant::config::{self, Config};
use pharmacist_assistant::ingest;

/// Pharmacist Assistant: grounded answers about a medicine reference document.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rxa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rxa",
    about = "Pharmacist Assistant: grounded answers about a medicine reference document",
    version,
    long_about = "Loads a single reference document (PDF, DOCX, TXT or Markdown), splits and \
    embeds it into an in-memory vector index, and answers questions with a language model that \
    is instructed to use only the retrieved passages."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rxa.toml")]
    config: PathBuf,

    /// Source document; overrides `[document].path`.
    #[arg(long, global = true)]
    document: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    ///
    /// Type `q` to quit, `/reset` to start a new conversation and
    /// `/sources` to show the passages each answer is based on.
    Chat,

    /// Ask a single question and print the answer.
    Ask {
        /// The question.
        question: String,

        /// Also print the source chunks.
        #[arg(long)]
        sources: bool,
    },

    /// Retrieve the chunks most similar to a query, without generating.
    Search {
        /// The search query.
        query: String,

        /// Number of results (defaults to `[retrieval].top_k`).
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        limit: Option<usize>,
    },

    /// Load and split the document, then print chunk statistics.
    ///
    /// Makes no embedding or generation calls.
    Chunks {
        /// Print every chunk.
        #[arg(long)]
        full: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pharmacist=info,rxa=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let fatal = err
            .downcast_ref::<pharmacist_core::Error>()
            .map(|e| e.is_fatal())
            .unwrap_or(true);
        error!(error = %format!("{err:#}"), fatal, "command failed");
        eprintln!("Error: {err:#}");
        if fatal {
            eprintln!("The assistant cannot start with this document or configuration; fix the problem above and restart.");
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = config::load_config(&cli.config)?;
    if let Some(path) = cli.document {
        cfg.document.path = path;
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => chat(&cfg).await,
        Commands::Ask { question, sources } => {
            let session = ingest::build_session(&cfg).await?;
            let answer = session.engine.ask_detailed(&question).await?;
            println!("{}", render_answer(&answer, sources));
            Ok(())
        }
        Commands::Search { query, limit } => {
            if let Some(limit) = limit {
                cfg.retrieval.top_k = limit;
                config::validate(&cfg)?;
            }
            let (_, _, retriever) = ingest::build_retriever(&cfg).await?;
            let results = retriever.retrieve_scored(&query).await?;
            println!("{}", render_results(&results));
            Ok(())
        }
        Commands::Chunks { full } => chunks(&cfg, full),
    }
}

async fn chat(cfg: &Config) -> Result<()> {
    let session = ingest::build_session(cfg).await?;
    let interactive = atty::is(atty::Stream::Stdin);

    if interactive {
        println!(
            "Loaded {} ({} chunks). Ask a question about the document; /help for commands, q to quit.",
            session.document.id, session.chunk_count
        );
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let mut interrupts = Interrupts::ctrl_c();
    run_chat(&session.engine, stdin, &mut stdout, interactive, &mut interrupts).await?;

    // The stdin reader thread may still be blocked on a read, which would
    // stall runtime shutdown until the next line arrives.
    stdout.flush()?;
    std::process::exit(0);
}

fn chunks(cfg: &Config, full: bool) -> Result<()> {
    let (document, chunks) = ingest::load_and_split(cfg)?;
    let sizes: Vec<usize> = chunks.iter().map(|c| c.char_len()).collect();
    let total: usize = sizes.iter().sum();
    let oversized = sizes
        .iter()
        .filter(|&&n| n > cfg.chunking.chunk_size)
        .count();

    let mut out = std::io::stdout().lock();
    writeln!(out, "document: {}", document.id)?;
    writeln!(out, "  content type: {}", document.content_type)?;
    if let Some(pages) = document.page_count {
        writeln!(out, "  pages: {}", pages)?;
    }
    writeln!(out, "  characters: {}", document.text.chars().count())?;
    writeln!(out, "  sha256: {}", document.content_hash)?;
    writeln!(out, "  loaded at: {}", document.loaded_at.to_rfc3339())?;
    writeln!(
        out,
        "chunks: {} (chunk_size {}, overlap {})",
        chunks.len(),
        cfg.chunking.chunk_size,
        cfg.chunking.chunk_overlap
    )?;
    if !sizes.is_empty() {
        writeln!(
            out,
            "  min/avg/max chars: {}/{}/{}",
            sizes.iter().min().copied().unwrap_or(0),
            total / sizes.len(),
            sizes.iter().max().copied().unwrap_or(0)
        )?;
    }
    writeln!(out, "  oversized: {}", oversized)?;

    if full {
        for chunk in &chunks {
            writeln!(
                out,
                "\n--- chunk #{} (byte {}, {} chars) ---",
                chunk.sequence_index,
                chunk.start_offset,
                chunk.char_len()
            )?;
            writeln!(out, "{}", chunk.text.trim_end())?;
        }
    }
    Ok(())
}
