//! Answer post-processing: cleanup, quality gates, and fallback synthesis.
//!
//! Small instruction-following models echo prompts, emit bullets, or repeat
//! the question back. This module scrubs the raw generation down to a single
//! clean sentence, rejects output that is still unusable or merely echoes
//! the question, and — when rejection happens — synthesizes a deterministic
//! extractive answer from the top context document instead. A rejected
//! generation is never surfaced as an error.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::RankedHit;
use crate::normalize;
use crate::prompt::NO_ANSWER;

static DOC_ECHO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[?Doc\s*\d+\]?:?.*\n?").expect("static regex"));
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(HISTÓRICO:|CONTEXTO:|PERGUNTA|RESPOSTA:|###|```)").expect("static regex")
});
static LEAD_BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-•*>]+\s*").expect("static regex"));
static LEAD_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*[(\[{“"'`]+"#).expect("static regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));
static BAD_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-•*>(\[{]").expect("static regex"));

/// Maximum length of an accepted answer, in characters.
const MAX_ANSWER_CHARS: usize = 300;
/// Maximum length of a synthesized fallback sentence, in characters.
const MAX_FALLBACK_CHARS: usize = 220;
/// Excerpt length used when the top context has no sentence-worthy content.
const FALLBACK_EXCERPT_CHARS: usize = 160;
/// Question prefix length compared against the answer by the echo gate.
const ECHO_PREFIX_CHARS: usize = 20;
/// Similarity ratio at or above which an answer counts as a question echo.
const ECHO_RATIO: f64 = 0.80;

/// Scrub raw generated text down to one clean sentence.
///
/// Strips `[Doc N]: ...` echo lines and section markers, leading bullets
/// and opening quotes/brackets, collapses whitespace, keeps only the first
/// sentence, and hard-truncates to 300 characters.
pub fn cleanup_answer(raw: &str) -> String {
    let txt = DOC_ECHO_RE.replace_all(raw, "");
    let txt = MARKER_RE.replace_all(&txt, "");
    let txt = LEAD_BULLET_RE.replace(&txt, "");
    let txt = LEAD_OPEN_RE.replace(&txt, "");
    let txt = WHITESPACE_RE.replace_all(&txt, " ");
    let txt = txt.trim();

    let first = first_sentence(txt).trim();
    let first = truncate_chars(first, MAX_ANSWER_CHARS);

    // truncation or sentence-splitting can re-expose a leading bullet
    let first = LEAD_BULLET_RE.replace(&first, "");
    let first = LEAD_OPEN_RE.replace(&first, "");
    first.trim().to_string()
}

/// Quality gate: reject empty, too-short, letterless, or still-bulleted
/// output.
pub fn looks_bad(text: &str) -> bool {
    if text.is_empty() {
        return true;
    }
    if text.chars().count() < 15 {
        return true;
    }
    if !text.chars().any(|c| c.is_alphabetic()) {
        return true;
    }
    BAD_START_RE.is_match(text)
}

/// Echo gate: does the answer substantially repeat the question?
///
/// Two independent conditions, OR'd: the folded answer starts with the
/// first 20 folded characters of the question, or the matching-blocks
/// similarity ratio between the folded forms is >= 0.80.
pub fn too_similar_to_question(answer: &str, question: &str) -> bool {
    let a = normalize::fold(answer);
    let q = normalize::fold(question);
    let prefix: String = q.chars().take(ECHO_PREFIX_CHARS).collect();
    if a.starts_with(&prefix) {
        return true;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let q_chars: Vec<char> = q.chars().collect();
    similarity_ratio(&a_chars, &q_chars) >= ECHO_RATIO
}

/// Deterministic extractive fallback: the top context's first sentence
/// (or a short excerpt), capped at 220 characters, with all context ids
/// cited in retrieval order. No model call.
pub fn synthesize_from_contexts(contexts: &[RankedHit]) -> String {
    let Some(top) = contexts.first() else {
        return NO_ANSWER.to_string();
    };
    let text = top.text.trim();
    let mut sent = first_sentence(text).trim().to_string();
    if sent.chars().count() < 10 {
        sent = text.chars().take(FALLBACK_EXCERPT_CHARS).collect::<String>();
        sent = sent.trim().to_string();
    }
    let sent = truncate_chars(&sent, MAX_FALLBACK_CHARS);
    format!("{} {}", sent, sources_suffix(contexts))
}

/// `(Fontes: Doc X, Doc Y)` listing every context id in retrieval order.
pub fn sources_suffix(contexts: &[RankedHit]) -> String {
    let ids = contexts
        .iter()
        .map(|c| format!("Doc {}", c.id))
        .collect::<Vec<_>>()
        .join(", ");
    format!("(Fontes: {})", ids)
}

/// Full post-processing state machine for a raw generation.
///
/// Cleans the text; if it fails the quality gate or echoes the question,
/// the generation is discarded entirely in favor of [`synthesize_from_contexts`].
/// An accepted answer lacking a `(Fontes:` marker gets one appended.
pub fn finalize_answer(raw: &str, question: &str, contexts: &[RankedHit]) -> String {
    let clean = cleanup_answer(raw);
    if looks_bad(&clean) || too_similar_to_question(&clean, question) {
        return synthesize_from_contexts(contexts);
    }
    if clean.contains("(Fontes:") {
        clean
    } else {
        format!("{} {}", clean, sources_suffix(contexts))
    }
}

/// Up to and including the first `.`/`!`/`?` that is followed by
/// whitespace; the whole text when no such boundary exists.
fn first_sentence(text: &str) -> &str {
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(_, next)) = iter.peek() {
                if next.is_whitespace() {
                    return &text[..i + c.len_utf8()];
                }
            }
        }
    }
    text
}

/// Truncate to `max` characters, appending an ellipsis when cut.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}…", cut.trim_end())
}

/// Matching-blocks similarity in `[0, 1]`: twice the total matched length
/// over the combined length. Blocks are found by recursively taking the
/// longest common contiguous run, as in Ratcliff-Obershelp.
fn similarity_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_len(a, b) as f64 / total as f64
}

fn matched_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (ia, ib, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matched_len(&a[..ia], &b[..ib]) + matched_len(&a[ia + len..], &b[ib + len..])
}

/// `(start_a, start_b, len)` of the longest common contiguous run.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut cur = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                let run = prev[j] + 1;
                cur[j + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            }
        }
        prev = cur;
    }
    best
}
