//! # Sabiá CLI (`sabia`)
//!
//! The `sabia` binary drives the question-answering service: seeding and
//! ingesting documents, one-shot queries, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! sabia --config ./config/sabia.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sabia seed` | Embed the built-in sample corpus into the index |
//! | `sabia ingest <file>` | Chunk, embed, and index a local text file |
//! | `sabia query "<question>"` | Answer a question from the command line |
//! | `sabia serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Seed the sample corpus and persist it
//! sabia seed
//!
//! # Ingest lecture notes
//! sabia ingest ./notas/aula01.txt
//!
//! # Ask a question against the persisted index
//! sabia query "O que é RAG?"
//!
//! # Serve the API on the configured bind address
//! sabia serve
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing_subscriber::EnvFilter;

use sabia::config::{load_config, Config};
use sabia::embedding::create_embedder;
use sabia::generate::{create_generator, GenerationOptions};
use sabia::index::VectorIndex;
use sabia::ingest;
use sabia::rag::Pipeline;
use sabia::server;

/// Sabiá — retrieval-augmented question answering for Portuguese document
/// collections.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file is not an error; defaults are used instead.
#[derive(Parser)]
#[command(
    name = "sabia",
    about = "Sabiá — retrieval-augmented question answering over your own documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sabia.toml`. Index location, retrieval knobs,
    /// and the embedding/generation providers are read from this file.
    #[arg(long, global = true, default_value = "./config/sabia.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Embed the built-in sample corpus into the index.
    ///
    /// Intended for first runs and demos. Appends to whatever the
    /// persisted index already holds.
    Seed,

    /// Ingest a local text file.
    ///
    /// The file is chunked into word windows per the `[chunking]` settings,
    /// embedded, and added to the index.
    Ingest {
        /// Path to a UTF-8 text file.
        file: PathBuf,

        /// Index the file as a single document instead of chunking it.
        #[arg(long)]
        no_chunk: bool,
    },

    /// Answer a question from the command line.
    ///
    /// Retrieves against the persisted index, calls the generation
    /// provider, and prints the final answer with its sources.
    Query {
        /// The question to answer.
        question: String,

        /// Override the number of passages to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Start the JSON HTTP API.
    ///
    /// Binds to `[server].bind`, restores or seeds the index on startup,
    /// and persists it on shutdown when `[index].persist` is set.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sabia=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Seed => {
            let (index, embedder) = open_index(&cfg)?;
            let total = ingest::seed_samples(&index, embedder.as_ref()).await?;
            persist(&cfg, &index)?;
            println!("Index seeded: {} documents total.", total);
        }
        Commands::Ingest { file, no_chunk } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let (index, embedder) = open_index(&cfg)?;
            let chunking = (!no_chunk).then_some(&cfg.chunking);
            let report = ingest::ingest_texts(
                &index,
                embedder.as_ref(),
                vec![text],
                vec![source_meta(&file)],
                chunking,
            )
            .await?;
            persist(&cfg, &index)?;
            println!(
                "Ingested {} chunk(s) from {} ({} documents total).",
                report.ingested,
                file.display(),
                report.total_docs
            );
        }
        Commands::Query { question, top_k } => {
            let (index, embedder) = open_index(&cfg)?;
            let generator = Arc::from(create_generator(&cfg.generation)?);
            let pipeline = Pipeline::new(
                Arc::new(index),
                embedder,
                generator,
                cfg.retrieval.clone(),
                cfg.chat.clone(),
            );
            let top_k = top_k.unwrap_or(cfg.retrieval.top_k);
            let opts = GenerationOptions::from_config(&cfg.generation);
            let response = pipeline.answer(&question, top_k, opts).await?;
            println!("{}", response.answer);
            if !response.sources.is_empty() {
                let ids: Vec<String> =
                    response.sources.iter().map(|id| id.to_string()).collect();
                println!("Fontes: {}", ids.join(", "));
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

/// Restore the persisted index (if any) and build the embedder.
fn open_index(
    cfg: &Config,
) -> Result<(RwLock<VectorIndex>, Arc<dyn sabia::embedding::Embedder>)> {
    let mut index = VectorIndex::new();
    index.load(&cfg.index.dir)?;
    let embedder: Arc<dyn sabia::embedding::Embedder> =
        Arc::from(create_embedder(&cfg.embedding)?);
    Ok((RwLock::new(index), embedder))
}

fn persist(cfg: &Config, index: &RwLock<VectorIndex>) -> Result<()> {
    if cfg.index.persist {
        index.read().unwrap().save(&cfg.index.dir)?;
    }
    Ok(())
}

fn source_meta(file: &std::path::Path) -> sabia::models::Meta {
    let mut meta = sabia::models::Meta::new();
    meta.insert(
        "source".to_string(),
        serde_json::Value::String(file.display().to_string()),
    );
    meta
}
