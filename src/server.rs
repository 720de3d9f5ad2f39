//! JSON HTTP API.
//!
//! Exposes the ingestion and answering paths to UI clients. All shared
//! state (index, chat memory, collaborator backends) is explicitly
//! constructed at startup and handed to handlers through Axum's `State`
//! extractor — nothing lives in module-level globals.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Service status, document count, index readiness |
//! | `GET/POST` | `/ingest/sample` | Ingest the built-in sample corpus |
//! | `POST` | `/ingest/texts` | Ingest raw texts (optionally chunked) |
//! | `POST` | `/query` | Single-turn question answering |
//! | `POST` | `/chat` | Conversational answering with session memory |
//! | `POST` | `/chat/reset/{session_id}` | Forget a session's history |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embedding_failed` (502),
//! `generation_failed` (502), `internal` (500). A question with no
//! relevant context is NOT an error — it returns the refusal answer.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser frontends
//! on other ports can call the API directly.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generate::{create_generator, GenerationOptions};
use crate::index::{IndexError, VectorIndex};
use crate::ingest;
use crate::memory::ChatMemory;
use crate::models::{ChatTurn, IngestReport, Meta, RagResponse, Role};
use crate::rag::Pipeline;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pipeline: Arc<Pipeline>,
    memory: Arc<ChatMemory>,
}

/// Build the pipeline from configuration, bootstrap the index, and serve
/// until interrupted. The index is persisted on shutdown when
/// `index.persist` is set.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let config = Arc::new(config.clone());

    let index = Arc::new(RwLock::new(VectorIndex::new()));
    let embedder: Arc<dyn crate::embedding::Embedder> =
        Arc::from(create_embedder(&config.embedding)?);
    let generator: Arc<dyn crate::generate::Generator> =
        Arc::from(create_generator(&config.generation)?);

    // Cold start must not block serving: a failed bootstrap is logged and
    // the service comes up with an empty index.
    match ingest::load_or_seed(&config, &index, embedder.as_ref()).await {
        Ok(total) => info!(docs = total, "startup bootstrap complete"),
        Err(e) => warn!(error = %e, "startup bootstrap failed; serving empty index"),
    }

    let pipeline = Arc::new(Pipeline::new(
        index.clone(),
        embedder,
        generator,
        config.retrieval.clone(),
        config.chat.clone(),
    ));
    let memory = Arc::new(ChatMemory::new(config.chat.max_turns));

    let state = AppState {
        config: config.clone(),
        pipeline,
        memory,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/ingest/sample", get(handle_ingest_sample).post(handle_ingest_sample))
        .route("/ingest/texts", post(handle_ingest_texts))
        .route("/query", post(handle_query))
        .route("/chat", post(handle_chat))
        .route("/chat/reset/{session_id}", post(handle_chat_reset))
        .layer(cors)
        .with_state(state);

    let bind_addr = config.server.bind.clone();
    info!(addr = %bind_addr, "API server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if config.index.persist {
        let guard = index.read().unwrap();
        match guard.save(&config.index.dir) {
            Ok(()) => info!(dir = %config.index.dir.display(), "index persisted on shutdown"),
            Err(e) => error!(error = %e, "failed to persist index on shutdown"),
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Map a pipeline failure to the most specific HTTP error. Dimension and
/// shape problems are caller errors; collaborator failures are upstream
/// (502) so clients can tell "bad request" from "backend down".
fn classify_error(err: anyhow::Error) -> AppError {
    if err.downcast_ref::<IndexError>().is_some() {
        return bad_request(err.to_string());
    }
    let msg = format!("{:#}", err);
    if msg.contains("Failed to embed") || msg.contains("Embedding") {
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "embedding_failed".to_string(),
            message: msg,
        }
    } else if msg.contains("Inference API") || msg.contains("Generation") {
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "generation_failed".to_string(),
            message: msg,
        }
    } else {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: msg,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    /// Documents currently in the index.
    docs: usize,
    /// Whether the first insertion has fixed the index dimension.
    index_ready: bool,
    version: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let index = state.pipeline.index().read().unwrap();
    Json(HealthResponse {
        status: "ok".to_string(),
        docs: index.count(),
        index_ready: index.dim().is_some(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ ingestion ============

#[derive(Deserialize)]
struct IngestTextsBody {
    texts: Vec<String>,
    #[serde(default)]
    metas: Vec<Meta>,
    /// Split long texts into word windows before embedding.
    #[serde(default = "default_chunk")]
    chunk: bool,
}

fn default_chunk() -> bool {
    true
}

async fn handle_ingest_texts(
    State(state): State<AppState>,
    Json(body): Json<IngestTextsBody>,
) -> Result<Json<IngestReport>, AppError> {
    if body.texts.is_empty() {
        return Err(bad_request("texts must not be empty"));
    }
    let chunking = body.chunk.then_some(&state.config.chunking);
    let report = ingest::ingest_texts(
        state.pipeline.index(),
        state.pipeline.embedder().as_ref(),
        body.texts,
        body.metas,
        chunking,
    )
    .await
    .map_err(classify_error)?;
    Ok(Json(report))
}

async fn handle_ingest_sample(
    State(state): State<AppState>,
) -> Result<Json<IngestReport>, AppError> {
    let (texts, metas) = ingest::sample_documents();
    let report = ingest::ingest_texts(
        state.pipeline.index(),
        state.pipeline.embedder().as_ref(),
        texts,
        metas,
        None,
    )
    .await
    .map_err(classify_error)?;
    Ok(Json(report))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryBody {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_new_tokens: Option<u32>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<RagResponse>, AppError> {
    if body.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let top_k = body.top_k.unwrap_or(state.config.retrieval.top_k);
    let opts = generation_opts(&state, body.temperature, body.max_new_tokens);
    let response = state
        .pipeline
        .answer(&body.question, top_k, opts)
        .await
        .map_err(classify_error)?;
    Ok(Json(response))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatBody {
    session_id: String,
    message: String,
    /// Caller-supplied history; when present it overrides server memory.
    #[serde(default)]
    history: Vec<ChatTurn>,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_new_tokens: Option<u32>,
    #[serde(default)]
    system_prompt: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    #[serde(flatten)]
    rag: RagResponse,
    session_id: String,
    history_len: usize,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatResponse>, AppError> {
    if body.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let history = if body.history.is_empty() {
        state.memory.get(&body.session_id)
    } else {
        body.history
    };
    let top_k = body.top_k.unwrap_or(state.config.retrieval.top_k);
    let opts = generation_opts(&state, body.temperature, body.max_new_tokens);

    let rag = state
        .pipeline
        .chat(
            &body.message,
            &history,
            top_k,
            opts,
            body.system_prompt.as_deref(),
        )
        .await
        .map_err(classify_error)?;

    state.memory.append(&body.session_id, Role::User, &body.message);
    state
        .memory
        .append(&body.session_id, Role::Assistant, &rag.answer);

    let history_len = state.memory.len(&body.session_id);
    Ok(Json(ChatResponse {
        rag,
        session_id: body.session_id,
        history_len,
    }))
}

#[derive(Serialize)]
struct ChatResetResponse {
    ok: bool,
    session_id: String,
}

async fn handle_chat_reset(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<ChatResetResponse> {
    state.memory.reset(&session_id);
    Json(ChatResetResponse {
        ok: true,
        session_id,
    })
}

fn generation_opts(
    state: &AppState,
    temperature: Option<f32>,
    max_new_tokens: Option<u32>,
) -> GenerationOptions {
    GenerationOptions {
        temperature: temperature.unwrap_or(state.config.generation.temperature),
        max_new_tokens: max_new_tokens.unwrap_or(state.config.generation.max_new_tokens),
    }
}
