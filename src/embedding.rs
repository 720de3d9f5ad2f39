//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and two implementations:
//! - **[`DisabledEmbedder`]** — returns errors; used when embeddings are not
//!   configured.
//! - **[`HfEmbedder`]** — calls the Hugging Face Inference API
//!   feature-extraction pipeline with retry and backoff.
//!
//! Normalization policy is owned here: inputs are canonicalized
//! ([`crate::normalize::canonicalize`]) before the request, and output
//! vectors are L2-normalized, so downstream inner-product search equals
//! cosine similarity regardless of what the remote model returns.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::normalize;

/// Trait for embedding backends.
///
/// `encode` returns one vector per input text, in input order, all of the
/// same width. An empty input yields an empty matrix without touching the
/// backend; `dims` reports the width such a result would have had.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Vector width produced by this backend.
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Create the appropriate [`Embedder`] based on configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "huggingface" => Ok(Box::new(HfEmbedder::new(config.clone()))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// A no-op embedder that always returns errors.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn dims(&self) -> usize {
        0
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        bail!("Embedding provider is disabled")
    }
}

/// Embedding backend using the Hugging Face Inference API
/// feature-extraction pipeline.
///
/// Reads the API token from the `HF_TOKEN` environment variable at call
/// time; unauthenticated calls are attempted without a token.
pub struct HfEmbedder {
    config: EmbeddingConfig,
}

impl HfEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://api-inference.huggingface.co/pipeline/feature-extraction/{}",
            self.config.model
        )
    }
}

#[async_trait]
impl Embedder for HfEmbedder {
    fn dims(&self) -> usize {
        self.config.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let normed: Vec<String> = texts.iter().map(|t| normalize::canonicalize(t)).collect();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "inputs": normed,
            "options": { "wait_for_model": true },
        });

        let token = std::env::var("HF_TOKEN").ok();
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = client.post(self.endpoint()).json(&body);
            if let Some(token) = &token {
                request = request.header("Authorization", format!("Bearer {}", token));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let mut vectors = parse_feature_matrix(&json, texts.len())?;
                        for v in &mut vectors {
                            l2_normalize(v);
                        }
                        return Ok(vectors);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Inference API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Inference API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

/// Parse the feature-extraction response: a `(n, dim)` float matrix.
fn parse_feature_matrix(json: &serde_json::Value, expected_rows: usize) -> Result<Vec<Vec<f32>>> {
    let rows = json
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid feature-extraction response: not an array"))?;

    if rows.len() != expected_rows {
        bail!(
            "Inference API returned {} vectors for {} texts",
            rows.len(),
            expected_rows
        );
    }

    let mut vectors = Vec::with_capacity(rows.len());
    for row in rows {
        let values = row
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid feature-extraction response: row is not an array"))?;
        let vec: Vec<f32> = values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        vectors.push(vec);
    }
    Ok(vectors)
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt() + 1e-12;
    for x in v.iter_mut() {
        *x /= norm;
    }
}
