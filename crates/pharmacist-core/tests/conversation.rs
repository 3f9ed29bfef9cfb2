//! Conversation engine behaviour with in-process fake backends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pharmacist_core::conversation::{ConversationEngine, EngineOptions, EngineState};
use pharmacist_core::index::{BuildOptions, VectorIndex};
use pharmacist_core::{Chunk, EmbeddingBackend, Error, GenerationBackend, Result, Retriever};
use tokio::sync::Notify;

const KEYWORDS: [&str; 6] = [
    "paracetamol",
    "amoxicillin",
    "antibiotic",
    "ibuprofen",
    "inflammatory",
    "fever",
];

/// Bag-of-keywords embedder.
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingBackend for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keywords"
    }
    fn dims(&self) -> Option<usize> {
        Some(KEYWORDS.len() + 1)
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = KEYWORDS
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect();
        v.push(0.1);
        Ok(v)
    }
}

/// Answers from the first context paragraph and records every prompt.
#[derive(Default)]
struct EchoGenerator {
    prompts: Mutex<Vec<String>>,
    condensed: Option<String>,
}

impl EchoGenerator {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.ends_with("Standalone question:") {
            return Ok(self.condensed.clone().unwrap_or_default());
        }
        let context = prompt
            .split("Context:\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\n").next())
            .unwrap_or("");
        Ok(format!("According to the document: {context}"))
    }
}

/// [`KeywordEmbedder`] that starts failing once `broken` is set.
#[derive(Default)]
struct BreakableEmbedder {
    broken: AtomicBool,
}

#[async_trait]
impl EmbeddingBackend for BreakableEmbedder {
    fn model_name(&self) -> &str {
        "breakable"
    }
    fn dims(&self) -> Option<usize> {
        KeywordEmbedder.dims()
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(Error::embedding("breakable", "connection reset"));
        }
        KeywordEmbedder.embed(text).await
    }
}

struct FailingGenerator;

#[async_trait]
impl GenerationBackend for FailingGenerator {
    fn model_name(&self) -> &str {
        "failing"
    }
    async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
        Err(Error::generation("failing", "HTTP 529 overloaded"))
    }
}

/// Echoes like [`EchoGenerator`] but fails every condense request.
#[derive(Default)]
struct NoCondenseGenerator {
    echo: EchoGenerator,
}

#[async_trait]
impl GenerationBackend for NoCondenseGenerator {
    fn model_name(&self) -> &str {
        "no-condense"
    }
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        if prompt.ends_with("Standalone question:") {
            return Err(Error::generation("no-condense", "HTTP 500"));
        }
        self.echo.generate(prompt, max_tokens).await
    }
}

/// Blocks inside `generate` until released.
#[derive(Default)]
struct GatedGenerator {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl GenerationBackend for GatedGenerator {
    fn model_name(&self) -> &str {
        "gated"
    }
    async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok("done".to_string())
    }
}

fn leaflet() -> Vec<Chunk> {
    [
        "Amoxicillin is an antibiotic used to treat bacterial infections.",
        "Paracetamol is used to relieve pain and reduce fever.",
        "Ibuprofen is a non-steroidal anti-inflammatory drug.",
    ]
    .iter()
    .enumerate()
    .map(|(i, text)| Chunk {
        source_id: "leaflet.txt".into(),
        sequence_index: i,
        start_offset: i * 100,
        text: text.to_string(),
    })
    .collect()
}

async fn retriever(k: usize) -> Retriever {
    let embedder = Arc::new(KeywordEmbedder);
    let index = VectorIndex::build(leaflet(), embedder.as_ref(), &BuildOptions::default())
        .await
        .unwrap();
    Retriever::new(Arc::new(index), embedder, k).unwrap()
}

#[tokio::test]
async fn answers_from_the_relevant_chunk() {
    let generator = Arc::new(EchoGenerator::default());
    let engine = ConversationEngine::new(retriever(1).await, generator.clone());

    let answer = engine
        .ask_detailed("What is paracetamol used for?")
        .await
        .unwrap();

    assert!(answer.text.contains("used to relieve pain and reduce fever"));
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].sequence_index, 1);
    assert_eq!(engine.turn_count().unwrap(), 2);
    assert_eq!(engine.state(), EngineState::Idle);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("You are an AI Thai language assistant and medicine expert."));
    assert!(!prompts[0].contains("Conversation so far"));
    assert!(prompts[0].ends_with("Question: What is paracetamol used for?"));
}

#[tokio::test]
async fn empty_input_rejected_without_state_change() {
    let generator = Arc::new(EchoGenerator::default());
    let engine = ConversationEngine::new(retriever(3).await, generator.clone());

    for blank in ["", "   ", "\n\t"] {
        let err = engine.ask(blank).await.unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
    }
    assert_eq!(engine.turn_count().unwrap(), 0);
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn failed_generation_leaves_history_unchanged() {
    let engine = ConversationEngine::new(retriever(2).await, Arc::new(FailingGenerator));

    let err = engine.ask("What is ibuprofen?").await.unwrap_err();
    assert!(matches!(err, Error::Generation { .. }));
    assert!(!err.is_fatal());
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.turn_count().unwrap(), 0);
}

#[tokio::test]
async fn history_accumulates_then_reset_clears_it() {
    let generator = Arc::new(EchoGenerator::default());
    let engine = ConversationEngine::new(retriever(1).await, generator.clone());

    engine.ask("What is paracetamol used for?").await.unwrap();
    engine.ask("Is amoxicillin an antibiotic?").await.unwrap();
    assert_eq!(engine.turn_count().unwrap(), 4);

    let second = &generator.prompts()[1];
    assert!(second.contains("Conversation so far:\nUser: What is paracetamol used for?\nAssistant: According to the document:"));

    engine.reset().unwrap();
    assert_eq!(engine.turn_count().unwrap(), 0);

    engine.ask("What is ibuprofen?").await.unwrap();
    let last = generator.prompts().pop().unwrap();
    assert!(!last.contains("Conversation so far"));
    assert!(!last.contains("paracetamol"));
    assert!(!last.contains("amoxicillin"));
    assert_eq!(engine.turn_count().unwrap(), 2);
}

#[tokio::test]
async fn concurrent_requests_are_rejected_busy() {
    let generator = Arc::new(GatedGenerator::default());
    let engine = Arc::new(ConversationEngine::new(retriever(1).await, generator.clone()));

    let in_flight = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ask("What is paracetamol used for?").await })
    };
    generator.entered.notified().await;

    assert_eq!(engine.state(), EngineState::Generating);
    assert!(matches!(engine.ask("Another question").await, Err(Error::Busy)));
    assert!(matches!(engine.reset(), Err(Error::Busy)));
    assert!(matches!(engine.turn_count(), Err(Error::Busy)));

    generator.release.notify_one();
    let answer = in_flight.await.unwrap().unwrap();
    assert_eq!(answer, "done");
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.turn_count().unwrap(), 2);
}

#[tokio::test]
async fn dropped_request_returns_engine_to_idle() {
    let generator = Arc::new(GatedGenerator::default());
    let engine = ConversationEngine::new(retriever(1).await, generator);

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        engine.ask("What is paracetamol used for?"),
    )
    .await;
    assert!(outcome.is_err());

    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.turn_count().unwrap(), 0);
}

#[tokio::test]
async fn follow_ups_condensed_before_retrieval() {
    let generator = Arc::new(EchoGenerator {
        condensed: Some("What kind of drug is ibuprofen?".to_string()),
        ..Default::default()
    });
    let engine = ConversationEngine::new(retriever(1).await, generator.clone()).with_options(
        EngineOptions {
            condense_follow_ups: true,
            ..Default::default()
        },
    );

    engine.ask("What is paracetamol used for?").await.unwrap();
    let answer = engine.ask_detailed("And the other painkiller?").await.unwrap();

    assert_eq!(answer.sources[0].sequence_index, 2);
    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].ends_with("Follow Up Input: And the other painkiller?\nStandalone question:"));
    // The answer prompt keeps the user's own wording.
    assert!(prompts[2].ends_with("Question: And the other painkiller?"));
}

#[tokio::test]
async fn failed_retrieval_leaves_history_unchanged() {
    let embedder = Arc::new(BreakableEmbedder::default());
    let index = VectorIndex::build(leaflet(), embedder.as_ref(), &BuildOptions::default())
        .await
        .unwrap();
    let retriever = Retriever::new(Arc::new(index), embedder.clone(), 1).unwrap();
    let engine = ConversationEngine::new(retriever, Arc::new(EchoGenerator::default()));

    engine.ask("What is paracetamol used for?").await.unwrap();
    embedder.broken.store(true, Ordering::SeqCst);

    let err = engine.ask("Is amoxicillin an antibiotic?").await.unwrap_err();
    assert!(matches!(err, Error::Retrieval(_)), "{err}");
    assert!(!err.is_fatal());
    assert_eq!(engine.turn_count().unwrap(), 2);
    assert_eq!(engine.state(), EngineState::Idle);

    embedder.broken.store(false, Ordering::SeqCst);
    engine.ask("Is amoxicillin an antibiotic?").await.unwrap();
    assert_eq!(engine.turn_count().unwrap(), 4);
}

#[tokio::test]
async fn failed_condense_leaves_history_unchanged() {
    let generator = Arc::new(NoCondenseGenerator::default());
    let engine = ConversationEngine::new(retriever(1).await, generator.clone()).with_options(
        EngineOptions {
            condense_follow_ups: true,
            ..Default::default()
        },
    );

    engine.ask("What is paracetamol used for?").await.unwrap();
    let err = engine.ask("And the other painkiller?").await.unwrap_err();

    assert!(matches!(err, Error::Generation { .. }), "{err}");
    assert!(!err.is_fatal());
    assert_eq!(engine.turn_count().unwrap(), 2);
    assert_eq!(engine.state(), EngineState::Idle);
    // Only the first answer prompt reached the echo backend.
    assert_eq!(generator.echo.prompts().len(), 1);
}
