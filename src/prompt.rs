//! Prompt assembly for the single-turn and conversational paths.
//!
//! Both prompt shapes are deterministic for identical input: the keyword
//! list is sorted and de-duplicated, and context blocks follow retrieval
//! order. Determinism matters for testability and response caching.

use std::collections::BTreeMap;

use crate::models::{ChatTurn, RankedHit, Role};
use crate::normalize;

/// Fixed refusal answer used whenever no relevant context exists or the
/// model says the context does not cover the question.
pub const NO_ANSWER: &str = "Não sei com base nos documentos disponíveis.";

/// Sorted, de-duplicated question keywords as a display list.
fn keyword_list(question: &str, synonyms: &BTreeMap<String, String>) -> String {
    let mut tokens = normalize::tokenize(question, synonyms);
    tokens.sort();
    tokens.dedup();
    if tokens.is_empty() {
        "(nenhuma)".to_string()
    } else {
        tokens.join(", ")
    }
}

/// Build the single-turn instruction prompt: system rules, `[Doc id]`
/// context blocks, and the question.
pub fn build_query_prompt(
    question: &str,
    contexts: &[RankedHit],
    synonyms: &BTreeMap<String, String>,
) -> String {
    let context_block = if contexts.is_empty() {
        "(sem contexto)".to_string()
    } else {
        contexts
            .iter()
            .map(|c| format!("[Doc {}] {}", c.id, c.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    let kw = keyword_list(question, synonyms);

    format!(
        "Você é um assistente útil e conciso. Responda SOMENTE com base no CONTEXTO a seguir.\n\
         Priorize passagens que contenham as palavras da pergunta. Se houver discrepância, ignore passagens fora do tema.\n\
         Palavras da pergunta: {kw}\n\
         Se a resposta não estiver no contexto, diga '{NO_ANSWER}'.\n\
         Ao final, cite os IDs das fontes usadas no formato (Fontes: Doc X, Doc Y).\n\
         Formato: uma única frase, sem iniciar com traços/bullets e sem copiar o CONTEXTO.\n\
         CONTEXTO:\n{context_block}\n\n\
         PERGUNTA: {question}\nRESPOSTA:"
    )
}

/// Default system instructions for the conversational prompt. Callers may
/// override them wholesale; the override is inserted verbatim.
const CHAT_SYSTEM: &str = "Você é um assistente técnico e objetivo. REGRAS:\n\
    1) Responda em 1 frase, em português, sem listar nem copiar trechos do CONTEXTO.\n\
    2) Não use marcadores (ex.: '-', '*', '•') nem parênteses de abertura no início da resposta.\n\
    3) Não repita nem reformule a pergunta; não inicie com 'Explique'/'Resuma'.\n\
    4) Responda SOMENTE com base no CONTEXTO (e no histórico, se útil). Se faltar informação, diga: 'Não sei com base nos documentos disponíveis.'\n\
    5) Priorize passagens que contenham as palavras da pergunta; ignore passagens fora do tema.\n\
    6) Termine com as fontes no formato (Fontes: Doc X, Doc Y).";

/// Build the conversational prompt: system rules, a bounded role-labeled
/// history block, the question keywords, a fenced context block, and the
/// question.
pub fn build_chat_prompt(
    question: &str,
    contexts: &[RankedHit],
    history: &[ChatTurn],
    system_prompt: Option<&str>,
    history_window: usize,
    synonyms: &BTreeMap<String, String>,
) -> String {
    let context_block = if contexts.is_empty() {
        "(sem contexto)".to_string()
    } else {
        contexts
            .iter()
            .map(|c| format!("- (Doc {}): {}", c.id, c.text))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let kw = keyword_list(question, synonyms);
    let sys = system_prompt.unwrap_or(CHAT_SYSTEM);

    // Only a small tail of the history goes in, to limit bias and echo.
    let start = history.len().saturating_sub(history_window);
    let hist_block = if history[start..].is_empty() {
        "(sem histórico)".to_string()
    } else {
        history[start..]
            .iter()
            .map(|turn| {
                let label = match turn.role {
                    Role::User => "Usuário",
                    Role::Assistant => "Assistente",
                };
                format!("{}: {}", label, turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "{sys}\n\n\
         ### HISTÓRICO\n{hist_block}\n\n\
         ### PALAVRAS DA PERGUNTA\n{kw}\n\n\
         ### CONTEXTO (use APENAS como base; NÃO copie)\n```\n{context_block}\n```\n\n\
         ### PERGUNTA\n{question}\n\n\
         ### RESPOSTA (1 frase, sem bullets, com fontes):"
    )
}
