//! # Pharmacist Assistant
//!
//! A terminal assistant that answers questions about a single medicine
//! reference document using retrieval-augmented generation.
//!
//! The pipeline itself (chunking, vector index, retrieval, conversation
//! engine) lives in the `pharmacist-core` crate. This crate adds
//! everything that touches the outside world: configuration, document
//! loading, HTTP and on-device model backends, and the `rxa` shell.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  Document    │──▶│  Split + Embed   │──▶│ VectorIndex  │
//! │ PDF/DOCX/TXT │   │ (pharmacist-core)│   │  in memory   │
//! └──────────────┘   └──────────────────┘   └──────┬───────┘
//!                                                  │
//!                    ┌──────────────┐   ┌──────────▼───────┐
//!                    │  rxa chat    │◀─▶│ ConversationEngine│──▶ LLM
//!                    └──────────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rxa chunks                          # inspect chunking, no API calls
//! rxa search "paracetamol dose"       # retrieval only
//! rxa ask "What is paracetamol used for?" --sources
//! rxa chat                            # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`document`] | Document loading and metadata |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`embedding`] | OpenAI, Ollama and local embedding backends |
//! | [`generation`] | Anthropic and Ollama generation backends |
//! | [`retry`] | HTTP retry with exponential backoff |
//! | [`ingest`] | Startup pipeline: load, split, index, engine |
//! | [`chat`] | Interactive shell and output rendering |

pub mod chat;
pub mod config;
pub mod document;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod retry;
