use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            chat: ChatConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the persisted vector blob and document log.
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    /// Save the index to `dir` on shutdown.
    #[serde(default = "default_true")]
    pub persist: bool,
    /// Seed sample documents when the index comes up empty.
    #[serde(default = "default_true")]
    pub auto_seed: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            persist: true,
            auto_seed: true,
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in whitespace-separated words.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Words shared between consecutive windows.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    180
}
fn default_overlap() -> usize {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of contexts retrieved per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum embedding similarity for a hit to qualify as context.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    /// Maximum keyword-overlap bonus added to the embedding score.
    #[serde(default = "default_keyword_bonus")]
    pub keyword_bonus: f32,
    /// Overlap count at which the bonus saturates.
    #[serde(default = "default_overlap_saturation")]
    pub overlap_saturation: usize,
    /// Discard zero-overlap hits outright when at least one hit overlaps.
    /// When false, zero-overlap hits are merely demoted (no bonus).
    #[serde(default = "default_true")]
    pub prune_zero_overlap: bool,
    /// Tokenizer synonym table: surface form -> injected token.
    #[serde(default = "default_synonyms")]
    pub synonyms: BTreeMap<String, String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            keyword_bonus: default_keyword_bonus(),
            overlap_saturation: default_overlap_saturation(),
            prune_zero_overlap: true,
            synonyms: default_synonyms(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_min_similarity() -> f32 {
    0.18
}
fn default_keyword_bonus() -> f32 {
    0.35
}
fn default_overlap_saturation() -> usize {
    3
}
fn default_synonyms() -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert("h2o".to_string(), "agua".to_string());
    map
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"huggingface"` or `"disabled"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Vector width reported for zero-row results.
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_embedding_provider() -> String {
    "huggingface".to_string()
}
fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `"huggingface"` or `"disabled"`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Stop sequences sent to the backend to curb prompt echoing.
    #[serde(default = "default_stop_sequences")]
    pub stop: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_new_tokens: default_max_new_tokens(),
            timeout_secs: default_timeout_secs(),
            stop: default_stop_sequences(),
        }
    }
}

fn default_generation_provider() -> String {
    "huggingface".to_string()
}
fn default_generation_model() -> String {
    "HuggingFaceH4/zephyr-7b-beta".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_new_tokens() -> u32 {
    256
}
fn default_stop_sequences() -> Vec<String> {
    [
        "### CONTEXTO",
        "### PERGUNTA",
        "### HISTÓRICO",
        "### RESPOSTA",
        "```",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Turn pairs kept per session (2 entries each, oldest evicted first).
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Turns included in the chat prompt's history block.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            history_window: default_history_window(),
        }
    }
}

fn default_max_turns() -> usize {
    12
}
fn default_history_window() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Load and validate a TOML configuration file.
///
/// A missing file is not an error: every section has defaults, so the
/// service can come up with no configuration at all.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    // A window that advances by zero or fewer words would never terminate.
    if config.chunking.overlap >= config.chunking.max_tokens {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.max_tokens ({})",
            config.chunking.overlap,
            config.chunking.max_tokens
        );
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if !(-1.0..=1.0).contains(&config.retrieval.min_similarity) {
        anyhow::bail!("retrieval.min_similarity must be in [-1.0, 1.0]");
    }

    if config.retrieval.keyword_bonus < 0.0 {
        anyhow::bail!("retrieval.keyword_bonus must be >= 0.0");
    }

    if config.retrieval.overlap_saturation == 0 {
        anyhow::bail!("retrieval.overlap_saturation must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "huggingface" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or huggingface.",
            other
        ),
    }

    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.generation.provider.as_str() {
        "disabled" | "huggingface" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or huggingface.",
            other
        ),
    }

    if config.chat.max_turns == 0 {
        anyhow::bail!("chat.max_turns must be >= 1");
    }

    Ok(())
}
