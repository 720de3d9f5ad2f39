//! Core data models used throughout Sabia.
//!
//! These types represent the documents, search hits, chat turns, and API
//! response bodies that flow through the ingestion and answering pipeline.

use serde::{Deserialize, Serialize};

/// Arbitrary per-document metadata (source, topic, filename, ...).
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// A document stored in the vector index.
///
/// The `id` equals the document's insertion-order position and is never
/// reused or renumbered, even across a persisted reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: usize,
    pub text: String,
    #[serde(default)]
    pub meta: Meta,
}

/// A transient vector-search result. `score` is the raw cosine similarity
/// in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct Hit {
    pub id: usize,
    pub text: String,
    pub meta: Meta,
    pub score: f32,
}

/// A hit extended by the hybrid reranker. Never persisted.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub id: usize,
    pub text: String,
    pub meta: Meta,
    /// Hybrid score: embedding similarity plus keyword-overlap bonus.
    pub score: f32,
    /// The embedding-only similarity before any bonus was applied.
    pub orig_score: f32,
    /// Number of distinct question tokens found in the document text.
    pub overlap: usize,
}

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in a session's conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// Result of an ingestion call.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IngestReport {
    /// Number of chunks added by this call.
    pub ingested: usize,
    /// Total documents in the index after the call.
    pub total_docs: usize,
}

/// Diagnostic payload attached to query/chat responses.
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    /// First 1000 characters of the prompt sent to the generator.
    pub prompt: String,
}

/// Final answer produced by the RAG pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub answer: String,
    /// Ids of the context documents, in retrieval order.
    pub sources: Vec<usize>,
    /// Metadata of the context documents, parallel to `sources`.
    pub meta: Vec<Meta>,
    pub debug: DebugInfo,
}
