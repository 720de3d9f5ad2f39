//! Generation provider abstraction and implementations.
//!
//! Defines the [`Generator`] trait and two implementations:
//! - **[`DisabledGenerator`]** — returns errors; used when generation is not
//!   configured.
//! - **[`HfGenerator`]** — calls the Hugging Face Inference API
//!   text-generation endpoint.
//!
//! A generation failure is fatal to the request it belongs to and nothing
//! else: no retry here, no index state involved, and the error propagates
//! to the caller as-is. The quality of a *successful* generation is judged
//! later by the answer post-processor, never here.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Knobs forwarded per request; defaults come from configuration.
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_new_tokens: u32,
}

impl GenerationOptions {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_new_tokens: config.max_new_tokens,
        }
    }
}

/// Trait for text-generation backends.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a continuation for `prompt`.
    async fn generate(&self, prompt: &str, opts: GenerationOptions) -> Result<String>;
}

/// Create the appropriate [`Generator`] based on configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "huggingface" => Ok(Box::new(HfGenerator::new(config.clone()))),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// A no-op generator that always returns errors.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn generate(&self, _prompt: &str, _opts: GenerationOptions) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

/// Text generation via the Hugging Face Inference API.
///
/// Sends `return_full_text: false` plus the configured stop sequences so
/// the model returns only the continuation; not every model honors them,
/// which is why the answer post-processor exists.
pub struct HfGenerator {
    config: GenerationConfig,
}

impl HfGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://api-inference.huggingface.co/models/{}",
            self.config.model
        )
    }
}

#[async_trait]
impl Generator for HfGenerator {
    async fn generate(&self, prompt: &str, opts: GenerationOptions) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": opts.max_new_tokens,
                "temperature": opts.temperature,
                "return_full_text": false,
                "stop": self.config.stop,
            },
            "options": { "wait_for_model": true },
        });

        let mut request = client.post(self.endpoint()).json(&body);
        if let Ok(token) = std::env::var("HF_TOKEN") {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!(
                "Inference API returned {} for '{}': {}",
                status,
                self.config.model,
                body_text
            );
        }

        let json: serde_json::Value = response.json().await?;
        parse_generated_text(&json)
    }
}

/// Extract `generated_text` from either response shape the API produces:
/// a one-element list or a bare object.
fn parse_generated_text(json: &serde_json::Value) -> Result<String> {
    let text = json
        .get(0)
        .and_then(|item| item.get("generated_text"))
        .or_else(|| json.get("generated_text"))
        .and_then(|t| t.as_str());

    match text {
        Some(t) => Ok(t.trim().to_string()),
        None => bail!("Unexpected Inference API response shape: {}", json),
    }
}
