//! # Sabiá
//!
//! A retrieval-augmented question-answering service for Portuguese-language
//! document collections.
//!
//! Sabiá ingests raw texts, chunks and embeds them into an in-memory vector
//! index, and answers questions by retrieving the closest passages, reranking
//! them with keyword evidence, and prompting a hosted language model. Answers
//! that echo the question or come back malformed are replaced by a
//! deterministic synthesis built straight from the retrieved passages, so the
//! service degrades gracefully instead of returning junk.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Texts   │──▶│   Pipeline    │──▶│ VectorIndex   │
//! │ (ingest) │   │ Chunk+Embed  │   │ flat, cosine │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │
//!                ┌─────────────────────────┤
//!                ▼                         ▼
//!          ┌──────────┐             ┌──────────┐
//!          │   CLI    │             │   HTTP   │
//!          │ (sabia)  │             │  (axum)  │
//!          └──────────┘             └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sabia seed                    # embed the built-in sample corpus
//! sabia ingest ./notas.txt      # ingest a local text file
//! sabia query "O que é RAG?"    # one-shot question answering
//! sabia serve                   # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Text canonicalization and keyword extraction |
//! | [`chunk`] | Word-window text chunking |
//! | [`index`] | Flat cosine-similarity vector index with persistence |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generate`] | Generation provider abstraction |
//! | [`rerank`] | Hybrid reranking and the relevance gate |
//! | [`prompt`] | Grounded prompt construction |
//! | [`answer`] | Answer cleanup, echo detection, fallback synthesis |
//! | [`memory`] | Per-session chat history |
//! | [`rag`] | The retrieval→generation pipeline |
//! | [`ingest`] | Ingestion and startup bootstrap |
//! | [`server`] | JSON HTTP API |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod normalize;
pub mod prompt;
pub mod rag;
pub mod rerank;
pub mod server;
