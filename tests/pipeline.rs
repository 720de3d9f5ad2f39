//! End-to-end tests of the library surface: ingestion through answering,
//! persistence across restarts, and conversational memory. Embedding and
//! generation are stubbed so everything runs offline and deterministically.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sabia::config::{ChatConfig, Config, RetrievalConfig};
use sabia::embedding::Embedder;
use sabia::generate::{GenerationOptions, Generator};
use sabia::index::VectorIndex;
use sabia::ingest;
use sabia::memory::ChatMemory;
use sabia::models::{ChatTurn, Meta, Role};
use sabia::prompt::NO_ANSWER;
use sabia::rag::Pipeline;

/// Embeds known texts to fixed unit vectors; everything else gets the
/// default direction.
struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    default: Vec<f32>,
}

impl TableEmbedder {
    fn new(entries: &[(&str, Vec<f32>)], default: Vec<f32>) -> Self {
        let table = entries
            .iter()
            .map(|(text, vector)| (text.to_string(), vector.clone()))
            .collect();
        Self { table, default }
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    fn dims(&self) -> usize {
        self.default.len()
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| self.table.get(t).cloned().unwrap_or(self.default.clone()))
            .collect())
    }
}

/// Returns a canned answer, ignoring the prompt.
struct CannedGenerator {
    reply: String,
}

#[async_trait]
impl Generator for CannedGenerator {
    async fn generate(&self, _prompt: &str, _opts: GenerationOptions) -> Result<String> {
        Ok(self.reply.clone())
    }
}

fn opts() -> GenerationOptions {
    GenerationOptions {
        temperature: 0.7,
        max_new_tokens: 64,
    }
}

fn build_pipeline(
    index: Arc<RwLock<VectorIndex>>,
    embedder: TableEmbedder,
    reply: &str,
) -> Pipeline {
    Pipeline::new(
        index,
        Arc::new(embedder),
        Arc::new(CannedGenerator {
            reply: reply.to_string(),
        }),
        RetrievalConfig::default(),
        ChatConfig::default(),
    )
}

#[tokio::test]
async fn test_ingest_then_answer_cites_sources() {
    let doc = "RAG combina recuperação de informação com geração de texto.";
    let question = "O que é RAG?";
    let embedder = TableEmbedder::new(
        &[(doc, vec![1.0, 0.0]), (question, vec![1.0, 0.0])],
        vec![0.0, 1.0],
    );

    let index = Arc::new(RwLock::new(VectorIndex::new()));
    ingest::ingest_texts(&index, &embedder, vec![doc.to_string()], vec![], None)
        .await
        .unwrap();

    let pipeline = build_pipeline(index, embedder, "RAG combina recuperação com geração.");
    let response = pipeline.answer(question, 3, opts()).await.unwrap();

    assert_eq!(response.sources, vec![0]);
    assert!(response.answer.contains("(Fontes: Doc 0)"));
    assert!(!response.debug.prompt.is_empty());
}

#[tokio::test]
async fn test_empty_index_refuses() {
    let embedder = TableEmbedder::new(&[], vec![1.0, 0.0]);
    let index = Arc::new(RwLock::new(VectorIndex::new()));
    let pipeline = build_pipeline(index, embedder, "irrelevante");

    let response = pipeline.answer("O que é RAG?", 3, opts()).await.unwrap();
    assert_eq!(response.answer, NO_ANSWER);
    assert!(response.sources.is_empty());
}

#[tokio::test]
async fn test_unrelated_question_refuses() {
    let doc = "RAG combina recuperação de informação com geração de texto.";
    let embedder = TableEmbedder::new(
        // orthogonal to the document: similarity 0.0 < gate
        &[(doc, vec![1.0, 0.0]), ("Qual o clima hoje?", vec![0.0, 1.0])],
        vec![1.0, 0.0],
    );

    let index = Arc::new(RwLock::new(VectorIndex::new()));
    ingest::ingest_texts(&index, &embedder, vec![doc.to_string()], vec![], None)
        .await
        .unwrap();

    let pipeline = build_pipeline(index, embedder, "irrelevante");
    let response = pipeline.answer("Qual o clima hoje?", 3, opts()).await.unwrap();
    assert_eq!(response.answer, NO_ANSWER);
}

#[tokio::test]
async fn test_echoed_answer_replaced_by_synthesis() {
    let doc = "RAG combina recuperação de informação com geração de texto.";
    let question = "O que é RAG exatamente nesse contexto?";
    let embedder = TableEmbedder::new(
        &[(doc, vec![1.0, 0.0]), (question, vec![1.0, 0.0])],
        vec![0.0, 1.0],
    );

    let index = Arc::new(RwLock::new(VectorIndex::new()));
    ingest::ingest_texts(&index, &embedder, vec![doc.to_string()], vec![], None)
        .await
        .unwrap();

    // generator parrots the question back
    let pipeline = build_pipeline(index, embedder, question);
    let response = pipeline.answer(question, 3, opts()).await.unwrap();

    assert_ne!(response.answer, question);
    assert!(response.answer.contains("RAG combina recuperação"));
    assert!(response.answer.contains("(Fontes: Doc 0)"));
}

#[tokio::test]
async fn test_persistence_survives_restart() {
    let tmp = tempfile::TempDir::new().unwrap();
    let doc = "Hugging Face Hub oferece modelos e datasets.";
    let question = "O que oferece o Hub?";
    let make_embedder = || {
        TableEmbedder::new(
            &[(doc, vec![0.6, 0.8]), (question, vec![0.6, 0.8])],
            vec![1.0, 0.0],
        )
    };

    // first process: ingest and persist
    {
        let index = RwLock::new(VectorIndex::new());
        let mut meta = Meta::new();
        meta.insert(
            "source".to_string(),
            serde_json::Value::String("huggingface".to_string()),
        );
        ingest::ingest_texts(&index, &make_embedder(), vec![doc.to_string()], vec![meta], None)
            .await
            .unwrap();
        index.read().unwrap().save(tmp.path()).unwrap();
    }

    // second process: restore and answer
    let mut restored = VectorIndex::new();
    restored.load(tmp.path()).unwrap();
    assert_eq!(restored.count(), 1);

    let pipeline = build_pipeline(
        Arc::new(RwLock::new(restored)),
        make_embedder(),
        "O Hub oferece modelos e datasets.",
    );
    let response = pipeline.answer(question, 3, opts()).await.unwrap();
    assert_eq!(response.sources, vec![0]);
    assert_eq!(
        response.meta[0].get("source"),
        Some(&serde_json::Value::String("huggingface".to_string()))
    );
}

#[tokio::test]
async fn test_load_or_seed_bootstrap_round_trip() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = Config::default();
    config.index.dir = tmp.path().to_path_buf();

    let embedder = TableEmbedder::new(&[], vec![1.0, 0.0]);

    // cold start seeds the sample corpus
    let index = RwLock::new(VectorIndex::new());
    let total = ingest::load_or_seed(&config, &index, &embedder).await.unwrap();
    assert_eq!(total, 3);
    index.read().unwrap().save(tmp.path()).unwrap();

    // warm start restores instead of reseeding
    let index = RwLock::new(VectorIndex::new());
    let total = ingest::load_or_seed(&config, &index, &embedder).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(index.read().unwrap().count(), 3);
}

#[tokio::test]
async fn test_chat_flow_with_session_memory() {
    let doc = "Prompt Engineering é a prática de desenhar prompts.";
    let question = "O que é prompt engineering?";
    let embedder = TableEmbedder::new(
        &[(doc, vec![1.0, 0.0]), (question, vec![1.0, 0.0])],
        vec![0.0, 1.0],
    );

    let index = Arc::new(RwLock::new(VectorIndex::new()));
    ingest::ingest_texts(&index, &embedder, vec![doc.to_string()], vec![], None)
        .await
        .unwrap();

    let pipeline = build_pipeline(index, embedder, "É a prática de desenhar prompts.");
    let memory = ChatMemory::new(12);

    let history = memory.get("aluno-1");
    assert!(history.is_empty());

    let response = pipeline
        .chat(question, &history, 3, opts(), None)
        .await
        .unwrap();
    memory.append("aluno-1", Role::User, question);
    memory.append("aluno-1", Role::Assistant, &response.answer);

    assert_eq!(memory.len("aluno-1"), 2);
    assert!(response.answer.contains("(Fontes: Doc 0)"));

    // second turn sees the first in its history
    let history = memory.get("aluno-1");
    assert_eq!(history[0].role, Role::User);
    let again = pipeline
        .chat("E como isso ajuda?", &history, 3, opts(), None)
        .await
        .unwrap();
    // unrelated follow-up maps to the default direction and gets refused
    assert_eq!(again.answer, NO_ANSWER);

    memory.reset("aluno-1");
    assert_eq!(memory.len("aluno-1"), 0);
}

#[tokio::test]
async fn test_caller_history_is_honored_by_chat_prompting() {
    let doc = "RAG combina recuperação de informação com geração de texto.";
    let question = "O que é RAG?";
    let embedder = TableEmbedder::new(
        &[(doc, vec![1.0, 0.0]), (question, vec![1.0, 0.0])],
        vec![0.0, 1.0],
    );

    let index = Arc::new(RwLock::new(VectorIndex::new()));
    ingest::ingest_texts(&index, &embedder, vec![doc.to_string()], vec![], None)
        .await
        .unwrap();

    let pipeline = build_pipeline(index, embedder, "RAG combina recuperação com geração.");
    let history = vec![
        ChatTurn {
            role: Role::User,
            content: "Oi!".to_string(),
        },
        ChatTurn {
            role: Role::Assistant,
            content: "Olá, posso ajudar?".to_string(),
        },
    ];
    let response = pipeline
        .chat(question, &history, 3, opts(), Some("Responda em uma frase."))
        .await
        .unwrap();
    assert!(response.answer.contains("(Fontes: Doc 0)"));
}
