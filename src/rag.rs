//! The retrieval-augmented answering pipeline.
//!
//! Wires the collaborators together for both answering paths:
//! question → embed → vector search → hybrid rerank → relevance gate →
//! prompt → generate → post-process. When the gate leaves no context, the
//! fixed refusal answer is returned and the generation backend is never
//! invoked.

use anyhow::{Context, Result};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::answer;
use crate::config::{ChatConfig, RetrievalConfig};
use crate::embedding::Embedder;
use crate::generate::{GenerationOptions, Generator};
use crate::index::VectorIndex;
use crate::models::{ChatTurn, DebugInfo, RagResponse, RankedHit};
use crate::prompt::{self, NO_ANSWER};

/// Characters of the prompt surfaced in `debug.prompt`.
const DEBUG_PROMPT_CHARS: usize = 1000;

/// All components of the answering path, explicitly constructed and shared
/// by reference so tests can build isolated instances with stub backends.
pub struct Pipeline {
    index: Arc<RwLock<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    retrieval: RetrievalConfig,
    chat: ChatConfig,
}

impl Pipeline {
    pub fn new(
        index: Arc<RwLock<VectorIndex>>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        retrieval: RetrievalConfig,
        chat: ChatConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            retrieval,
            chat,
        }
    }

    pub fn index(&self) -> &Arc<RwLock<VectorIndex>> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn retrieval(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    /// Retrieve, rerank, and gate the contexts for a question.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RankedHit>> {
        let vectors = self
            .embedder
            .encode(&[question.to_string()])
            .await
            .context("Failed to embed question")?;
        let query = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;

        let hits = {
            let index = self.index.read().unwrap();
            index.search(&query, top_k)?
        };
        debug!(candidates = hits.len(), "vector search complete");

        let ranked = crate::rerank::hybrid_rerank(hits, question, &self.retrieval);
        let gated = crate::rerank::relevance_gate(ranked, self.retrieval.min_similarity);
        debug!(contexts = gated.len(), "reranked and gated");
        Ok(gated)
    }

    /// Answer a single-turn question.
    pub async fn answer(
        &self,
        question: &str,
        top_k: usize,
        opts: GenerationOptions,
    ) -> Result<RagResponse> {
        let contexts = self.retrieve(question, top_k).await?;
        if contexts.is_empty() {
            return Ok(refusal_response());
        }

        let prompt = prompt::build_query_prompt(question, &contexts, &self.retrieval.synonyms);
        let raw = self.generator.generate(&prompt, opts).await?;
        let final_answer = answer::finalize_answer(&raw, question, &contexts);

        Ok(build_response(final_answer, contexts, &prompt))
    }

    /// Answer a conversational message against a session history.
    pub async fn chat(
        &self,
        message: &str,
        history: &[ChatTurn],
        top_k: usize,
        opts: GenerationOptions,
        system_prompt: Option<&str>,
    ) -> Result<RagResponse> {
        let contexts = self.retrieve(message, top_k).await?;
        if contexts.is_empty() {
            return Ok(refusal_response());
        }

        let prompt = prompt::build_chat_prompt(
            message,
            &contexts,
            history,
            system_prompt,
            self.chat.history_window,
            &self.retrieval.synonyms,
        );
        let raw = self.generator.generate(&prompt, opts).await?;
        let final_answer = answer::finalize_answer(&raw, message, &contexts);

        Ok(build_response(final_answer, contexts, &prompt))
    }
}

fn refusal_response() -> RagResponse {
    RagResponse {
        answer: NO_ANSWER.to_string(),
        sources: Vec::new(),
        meta: Vec::new(),
        debug: DebugInfo {
            prompt: "(sem contexto)".to_string(),
        },
    }
}

fn build_response(final_answer: String, contexts: Vec<RankedHit>, prompt: &str) -> RagResponse {
    let sources = contexts.iter().map(|c| c.id).collect();
    let meta = contexts.into_iter().map(|c| c.meta).collect();
    RagResponse {
        answer: final_answer,
        sources,
        meta,
        debug: DebugInfo {
            prompt: prompt.chars().take(DEBUG_PROMPT_CHARS).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Meta;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps exact texts to fixed vectors; unknown texts get a default.
    struct StubEmbedder {
        map: HashMap<String, Vec<f32>>,
        default: Vec<f32>,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn dims(&self) -> usize {
            self.default.len()
        }

        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| self.map.get(t).cloned().unwrap_or_else(|| self.default.clone()))
                .collect())
        }
    }

    /// Returns a canned reply and counts invocations.
    struct StubGenerator {
        reply: String,
        calls: AtomicUsize,
    }

    impl StubGenerator {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for StubGenerator {
        async fn generate(&self, _prompt: &str, _opts: GenerationOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    /// A generator that must never be reached.
    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(&self, _prompt: &str, _opts: GenerationOptions) -> Result<String> {
            bail!("backend unavailable")
        }
    }

    fn opts() -> GenerationOptions {
        GenerationOptions {
            temperature: 0.2,
            max_new_tokens: 64,
        }
    }

    fn pipeline_with(
        docs: Vec<(&str, Vec<f32>)>,
        question_vec: (&str, Vec<f32>),
        generator: Arc<dyn Generator>,
    ) -> Pipeline {
        let mut index = VectorIndex::new();
        let texts: Vec<String> = docs.iter().map(|(t, _)| t.to_string()).collect();
        let vectors: Vec<Vec<f32>> = docs.iter().map(|(_, v)| v.clone()).collect();
        if !texts.is_empty() {
            index.add_documents(texts, vec![], vectors).unwrap();
        }

        let mut map = HashMap::new();
        map.insert(question_vec.0.to_string(), question_vec.1.clone());
        let embedder = Arc::new(StubEmbedder {
            map,
            default: vec![1.0, 0.0],
        });

        Pipeline::new(
            Arc::new(RwLock::new(index)),
            embedder,
            generator,
            RetrievalConfig::default(),
            ChatConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_no_context_returns_refusal_without_generating() {
        let generator = StubGenerator::new("qualquer coisa");
        let pipeline = pipeline_with(
            vec![],
            ("pergunta sem resposta", vec![1.0, 0.0]),
            generator.clone(),
        );

        let response = pipeline.answer("pergunta sem resposta", 3, opts()).await.unwrap();
        assert_eq!(response.answer, NO_ANSWER);
        assert!(response.sources.is_empty());
        assert!(response.meta.is_empty());
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_gate_filters_low_similarity_contexts() {
        // orthogonal doc: similarity 0, below the 0.18 threshold
        let pipeline = pipeline_with(
            vec![("documento sobre capital", vec![0.0, 1.0])],
            ("qual a capital", vec![1.0, 0.0]),
            Arc::new(FailingGenerator),
        );
        let response = pipeline.answer("qual a capital", 3, opts()).await.unwrap();
        assert_eq!(response.answer, NO_ANSWER);
    }

    #[tokio::test]
    async fn test_accepted_answer_gets_citation() {
        let generator = StubGenerator::new("Brasília é a capital federal do país.");
        let pipeline = pipeline_with(
            vec![("A capital do Brasil é Brasília.", vec![1.0, 0.0])],
            ("qual a capital do brasil", vec![1.0, 0.0]),
            generator.clone(),
        );

        let response = pipeline
            .answer("qual a capital do brasil", 3, opts())
            .await
            .unwrap();
        assert_eq!(
            response.answer,
            "Brasília é a capital federal do país. (Fontes: Doc 0)"
        );
        assert_eq!(response.sources, vec![0]);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_echoed_answer_replaced_by_synthesis() {
        let generator = StubGenerator::new("qual a capital do brasil?");
        let pipeline = pipeline_with(
            vec![("A capital do Brasil é Brasília desde 1960.", vec![1.0, 0.0])],
            ("qual a capital do brasil", vec![1.0, 0.0]),
            generator,
        );

        let response = pipeline
            .answer("qual a capital do brasil", 3, opts())
            .await
            .unwrap();
        assert_eq!(
            response.answer,
            "A capital do Brasil é Brasília desde 1960. (Fontes: Doc 0)"
        );
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let pipeline = pipeline_with(
            vec![("A capital do Brasil é Brasília.", vec![1.0, 0.0])],
            ("qual a capital do brasil", vec![1.0, 0.0]),
            Arc::new(FailingGenerator),
        );
        let err = pipeline
            .answer("qual a capital do brasil", 3, opts())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("backend unavailable"));
    }

    #[tokio::test]
    async fn test_debug_prompt_is_truncated_excerpt() {
        let generator = StubGenerator::new("Brasília é a capital federal do país.");
        let long_doc = format!("A capital do Brasil é Brasília. {}", "detalhe ".repeat(400));
        let pipeline = pipeline_with(
            vec![(long_doc.as_str(), vec![1.0, 0.0])],
            ("qual a capital do brasil", vec![1.0, 0.0]),
            generator,
        );

        let response = pipeline
            .answer("qual a capital do brasil", 3, opts())
            .await
            .unwrap();
        assert!(response.debug.prompt.chars().count() <= DEBUG_PROMPT_CHARS);
        assert!(response.debug.prompt.contains("CONTEXTO"));
    }

    #[tokio::test]
    async fn test_chat_uses_history_and_cites() {
        let generator = StubGenerator::new("Ela fica no Planalto Central do país.");
        let pipeline = pipeline_with(
            vec![("A capital do Brasil é Brasília, no Planalto Central.", vec![1.0, 0.0])],
            ("e onde fica a capital", vec![1.0, 0.0]),
            generator,
        );

        let history = vec![
            ChatTurn {
                role: crate::models::Role::User,
                content: "qual a capital do brasil".to_string(),
            },
            ChatTurn {
                role: crate::models::Role::Assistant,
                content: "Brasília.".to_string(),
            },
        ];
        let response = pipeline
            .chat("e onde fica a capital", &history, 3, opts(), None)
            .await
            .unwrap();
        assert!(response.answer.contains("(Fontes: Doc 0)"));
        assert_eq!(response.sources, vec![0]);
    }

    #[tokio::test]
    async fn test_meta_parallel_to_sources() {
        let generator = StubGenerator::new("Brasília é a capital federal do país.");
        let mut index = VectorIndex::new();
        let mut meta = Meta::new();
        meta.insert("topic".to_string(), serde_json::Value::String("capital".to_string()));
        index
            .add_documents(
                vec!["A capital do Brasil é Brasília.".to_string()],
                vec![meta.clone()],
                vec![vec![1.0, 0.0]],
            )
            .unwrap();

        let mut map = HashMap::new();
        map.insert("qual a capital do brasil".to_string(), vec![1.0, 0.0]);
        let pipeline = Pipeline::new(
            Arc::new(RwLock::new(index)),
            Arc::new(StubEmbedder {
                map,
                default: vec![1.0, 0.0],
            }),
            generator,
            RetrievalConfig::default(),
            ChatConfig::default(),
        );

        let response = pipeline
            .answer("qual a capital do brasil", 3, opts())
            .await
            .unwrap();
        assert_eq!(response.meta.len(), response.sources.len());
        assert_eq!(response.meta[0], meta);
    }
}
