//! Hybrid reranking and the relevance gate.
//!
//! Vector search alone ranks by embedding similarity; the reranker blends
//! in a bounded lexical signal so passages that actually contain the
//! question's keywords float to the top. The relevance gate then drops
//! anything whose *embedding* similarity is below a minimum — the keyword
//! bonus can reorder candidates, but it can never qualify one.

use std::collections::HashSet;

use crate::config::RetrievalConfig;
use crate::models::{Hit, RankedHit};
use crate::normalize;

/// Re-rank vector hits by embedding score plus keyword-overlap bonus.
///
/// For each hit, `overlap` is the number of distinct question tokens
/// present in the hit's text, and the bonus is
/// `keyword_bonus * min(1, overlap / overlap_saturation)`. Hits are
/// re-sorted by hybrid score descending, with the original embedding score
/// as tie-break.
///
/// When `prune_zero_overlap` is set and at least one hit shares a keyword
/// with the question, all zero-overlap hits are discarded outright. This
/// trades recall for precision: a topically-similar passage with no
/// keyword in common is usually off-topic for the question asked. With the
/// flag off, zero-overlap hits simply receive no bonus and sink.
pub fn hybrid_rerank(hits: Vec<Hit>, question: &str, params: &RetrievalConfig) -> Vec<RankedHit> {
    if hits.is_empty() {
        return Vec::new();
    }

    let question_tokens: HashSet<String> = normalize::tokenize(question, &params.synonyms)
        .into_iter()
        .collect();

    let mut ranked: Vec<RankedHit> = hits
        .into_iter()
        .map(|hit| {
            let doc_tokens: HashSet<String> = normalize::tokenize(&hit.text, &params.synonyms)
                .into_iter()
                .collect();
            let overlap = question_tokens.intersection(&doc_tokens).count();
            let saturation = params.overlap_saturation.max(1) as f32;
            let bonus = params.keyword_bonus * (overlap as f32 / saturation).min(1.0);
            RankedHit {
                id: hit.id,
                text: hit.text,
                meta: hit.meta,
                score: hit.score + bonus,
                orig_score: hit.score,
                overlap,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.orig_score
                    .partial_cmp(&a.orig_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    if params.prune_zero_overlap && ranked.iter().any(|h| h.overlap > 0) {
        ranked.retain(|h| h.overlap > 0);
    }

    ranked
}

/// Drop hits whose embedding-only similarity falls below `min_similarity`.
/// The boundary is inclusive: a hit exactly at the threshold is kept.
pub fn relevance_gate(hits: Vec<RankedHit>, min_similarity: f32) -> Vec<RankedHit> {
    hits.into_iter()
        .filter(|h| h.orig_score >= min_similarity)
        .collect()
}
