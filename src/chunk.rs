//! Word-window text chunker.
//!
//! Splits input text on whitespace and emits overlapping fixed-size windows
//! of words. Each window becomes an independent document at ingestion time;
//! no parent/child relationship is persisted.

use anyhow::{bail, Result};

/// Split text into overlapping windows of `max_tokens` whitespace-separated
/// words, advancing by `max_tokens - overlap` words per step.
///
/// Text that yields no windows (empty or whitespace-only input) is returned
/// unchanged as a single-element result, never an empty one.
///
/// # Errors
///
/// Fails when `overlap >= max_tokens`: the window would advance by zero or
/// fewer words and never terminate.
pub fn chunk_text(text: &str, max_tokens: usize, overlap: usize) -> Result<Vec<String>> {
    if max_tokens == 0 || overlap >= max_tokens {
        bail!(
            "invalid chunking window: max_tokens={}, overlap={} (stride must be >= 1)",
            max_tokens,
            overlap
        );
    }
    let stride = max_tokens - overlap;

    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + max_tokens).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += stride;
    }

    if chunks.is_empty() {
        chunks.push(text.to_string());
    }
    Ok(chunks)
}
