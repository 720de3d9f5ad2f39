//! Ingestion pipeline and startup bootstrap.
//!
//! Texts are optionally chunked into word windows, embedded in one batch,
//! and inserted into the shared index. Each chunk becomes an independent
//! document carrying its parent's metadata.

use anyhow::Result;
use std::sync::RwLock;
use tracing::info;

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::Embedder;
use crate::index::VectorIndex;
use crate::models::{IngestReport, Meta};

/// Chunk (when configured), embed, and insert a batch of texts.
///
/// `metas` shorter than `texts` is padded with empty mappings; every chunk
/// of a text shares that text's metadata.
pub async fn ingest_texts(
    index: &RwLock<VectorIndex>,
    embedder: &dyn Embedder,
    texts: Vec<String>,
    metas: Vec<Meta>,
    chunking: Option<&ChunkingConfig>,
) -> Result<IngestReport> {
    let mut all_chunks = Vec::new();
    let mut all_metas = Vec::new();

    for (i, text) in texts.into_iter().enumerate() {
        let meta = metas.get(i).cloned().unwrap_or_default();
        let chunks = match chunking {
            Some(cfg) => chunk_text(&text, cfg.max_tokens, cfg.overlap)?,
            None => vec![text],
        };
        for chunk in chunks {
            all_chunks.push(chunk);
            all_metas.push(meta.clone());
        }
    }

    let vectors = embedder.encode(&all_chunks).await?;
    let report = {
        let mut index = index.write().unwrap();
        index.add_documents(all_chunks, all_metas, vectors)?
    };
    info!(
        ingested = report.ingested,
        total_docs = report.total_docs,
        "ingestion complete"
    );
    Ok(report)
}

/// The sample corpus seeded into empty indexes.
pub fn sample_documents() -> (Vec<String>, Vec<Meta>) {
    let texts = vec![
        "RAG combina recuperação de informação com geração de texto, melhorando precisão.".to_string(),
        "Hugging Face Hub oferece modelos, datasets e spaces para IA.".to_string(),
        "Prompt Engineering é a prática de desenhar prompts para melhorar a resposta de LLMs.".to_string(),
    ];
    let metas = vec![
        meta_entry("notas_aula", "RAG"),
        meta_entry("huggingface", "hub"),
        meta_entry("notas_aula", "prompt_engineering"),
    ];
    (texts, metas)
}

fn meta_entry(source: &str, topic: &str) -> Meta {
    let mut meta = Meta::new();
    meta.insert("source".to_string(), serde_json::Value::String(source.to_string()));
    meta.insert("topic".to_string(), serde_json::Value::String(topic.to_string()));
    meta
}

/// Embed and insert the sample corpus, unchunked.
pub async fn seed_samples(index: &RwLock<VectorIndex>, embedder: &dyn Embedder) -> Result<usize> {
    let (texts, metas) = sample_documents();
    let report = ingest_texts(index, embedder, texts, metas, None).await?;
    Ok(report.total_docs)
}

/// Startup bootstrap: restore the persisted index, and when it comes up
/// empty with auto-seed enabled, ingest the sample corpus.
pub async fn load_or_seed(
    config: &Config,
    index: &RwLock<VectorIndex>,
    embedder: &dyn Embedder,
) -> Result<usize> {
    {
        let mut index = index.write().unwrap();
        index.load(&config.index.dir)?;
    }
    let count = index.read().unwrap().count();
    if count > 0 {
        info!(docs = count, dir = %config.index.dir.display(), "index restored");
        return Ok(count);
    }
    if config.index.auto_seed {
        let total = seed_samples(index, embedder).await?;
        info!(docs = total, "index seeded with samples");
        return Ok(total);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;

    /// Embeds every text to a constant unit vector.
    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        fn dims(&self) -> usize {
            2
        }

        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn dims(&self) -> usize {
            2
        }

        async fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("embedding backend down")
        }
    }

    #[tokio::test]
    async fn test_ingest_without_chunking() {
        let index = RwLock::new(VectorIndex::new());
        let report = ingest_texts(
            &index,
            &ConstEmbedder,
            vec!["um".to_string(), "dois".to_string()],
            vec![],
            None,
        )
        .await
        .unwrap();
        assert_eq!(report.ingested, 2);
        assert_eq!(report.total_docs, 2);
    }

    #[tokio::test]
    async fn test_ingest_chunks_long_text() {
        let index = RwLock::new(VectorIndex::new());
        let long: String = (0..400).map(|i| format!("w{} ", i)).collect();
        let chunking = ChunkingConfig {
            max_tokens: 180,
            overlap: 30,
        };
        let report = ingest_texts(
            &index,
            &ConstEmbedder,
            vec![long],
            vec![],
            Some(&chunking),
        )
        .await
        .unwrap();
        // 400 words, stride 150: windows at 0, 150, 300
        assert_eq!(report.ingested, 3);
    }

    #[tokio::test]
    async fn test_chunks_inherit_parent_meta() {
        let index = RwLock::new(VectorIndex::new());
        let long: String = (0..400).map(|i| format!("w{} ", i)).collect();
        let chunking = ChunkingConfig {
            max_tokens: 180,
            overlap: 30,
        };
        ingest_texts(
            &index,
            &ConstEmbedder,
            vec![long],
            vec![meta_entry("arquivo", "teste")],
            Some(&chunking),
        )
        .await
        .unwrap();

        let guard = index.read().unwrap();
        for doc in guard.documents() {
            assert_eq!(
                doc.meta.get("source"),
                Some(&serde_json::Value::String("arquivo".to_string()))
            );
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_index_unchanged() {
        let index = RwLock::new(VectorIndex::new());
        let result = ingest_texts(
            &index,
            &BrokenEmbedder,
            vec!["texto".to_string()],
            vec![],
            None,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(index.read().unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_seed_samples_adds_three_docs() {
        let index = RwLock::new(VectorIndex::new());
        let total = seed_samples(&index, &ConstEmbedder).await.unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_load_or_seed_cold_start_seeds() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.index.dir = tmp.path().join("missing");
        let index = RwLock::new(VectorIndex::new());
        let total = load_or_seed(&config, &index, &ConstEmbedder).await.unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_load_or_seed_prefers_persisted_index() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.index.dir = tmp.path().to_path_buf();

        // persist a one-document index
        {
            let index = RwLock::new(VectorIndex::new());
            ingest_texts(&index, &ConstEmbedder, vec!["persistido".to_string()], vec![], None)
                .await
                .unwrap();
            index.read().unwrap().save(tmp.path()).unwrap();
        }

        let index = RwLock::new(VectorIndex::new());
        let total = load_or_seed(&config, &index, &ConstEmbedder).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_load_or_seed_respects_auto_seed_off() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.index.dir = tmp.path().join("missing");
        config.index.auto_seed = false;
        let index = RwLock::new(VectorIndex::new());
        let total = load_or_seed(&config, &index, &ConstEmbedder).await.unwrap();
        assert_eq!(total, 0);
    }
}
