//! Text normalization and lexical tokenization.
//!
//! Two distinct normal forms live here:
//!
//! - [`canonicalize`] — the embedding-side form (NFKC, case folding,
//!   whitespace collapse), applied to every text before vectorization so
//!   that case and spacing variants embed identically.
//! - [`fold`] — the lexical form (NFD, diacritics stripped, lowercased),
//!   used by the tokenizer and by the answer post-processor's echo gate.
//!
//! [`tokenize`] extracts keyword tokens for overlap scoring: alphanumeric
//! runs of length >= 3, minus Portuguese stop words, plus any configured
//! synonym injections.

use std::collections::BTreeMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Portuguese stop words excluded from keyword-overlap scoring.
const STOPWORDS_PT: &[&str] = &[
    "a", "o", "as", "os", "um", "uma", "uns", "umas", "de", "do", "da", "dos", "das", "em", "no",
    "na", "nos", "nas", "para", "por", "e", "ou", "que", "com", "se", "ao", "aos", "à", "às", "é",
    "são", "como", "sobre", "até", "mais", "menos", "sem", "sua", "seu", "suas", "seus", "minha",
    "meu", "nossa", "nosso", "nossas", "nossos", "isto", "isso", "aquilo", "este", "esta", "esse",
    "essa", "aquele", "aquela", "ele", "ela", "eles", "elas", "você", "vocês", "eu", "me", "te",
    "lhe", "vos", "del",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS_PT.contains(&token)
}

/// Canonicalize text for embedding: NFKC, lowercase, whitespace collapsed.
pub fn canonicalize(text: &str) -> String {
    let folded: String = text.nfkc().collect::<String>().to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fold text to its lexical form: decompose accents, strip combining marks,
/// lowercase, trim.
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Tokenize text for keyword-overlap scoring.
///
/// Emits ASCII-alphanumeric runs of length >= 3 from the folded text,
/// drops stop words, then applies the synonym table: for each
/// `surface -> injected` pair, if `surface` is present and `injected`
/// absent, `injected` is appended.
pub fn tokenize(text: &str, synonyms: &BTreeMap<String, String>) -> Vec<String> {
    let folded = fold(text);
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();

    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            current.push(c);
        } else if !current.is_empty() {
            push_token(&mut tokens, std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        push_token(&mut tokens, current);
    }

    for (surface, injected) in synonyms {
        if tokens.iter().any(|t| t == surface) && !tokens.iter().any(|t| t == injected) {
            tokens.push(injected.clone());
        }
    }

    tokens
}

fn push_token(tokens: &mut Vec<String>, token: String) {
    if token.len() >= 3 && !is_stopword(&token) {
        tokens.push(token);
    }
}
