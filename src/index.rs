//! In-memory vector index with cosine-similarity search and directory
//! persistence.
//!
//! Vectors are L2-normalized on the way in (insertion and query alike), so
//! inner-product search is numerically equal to cosine similarity. The index
//! dimensionality is fixed by the first insertion and enforced on every
//! subsequent insert and query.
//!
//! Persistence writes two artifacts under a directory: `vectors.bin` (a
//! little-endian f32 blob prefixed with the dimension) and `docs.jsonl`
//! (one JSON document record per line, in insertion order). Loading from a
//! directory where either artifact is missing resets the index to empty —
//! a cold start is not an error.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::models::{Document, Hit, IngestReport, Meta};

const VECTORS_FILE: &str = "vectors.bin";
const DOCS_FILE: &str = "docs.jsonl";

/// Guard against division by zero when normalizing zero vectors.
const NORM_EPSILON: f32 = 1e-12;

/// Input errors raised by index operations. All are fatal to the operation
/// and leave the index state untouched.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("query/vector width {got} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("got {vectors} vectors for {texts} texts")]
    CountMismatch { texts: usize, vectors: usize },
    #[error("vector {row} has width {got}, expected {expected}")]
    RaggedVectors {
        row: usize,
        expected: usize,
        got: usize,
    },
}

/// Row storage. The dimension only exists once the first insertion has
/// established it; an uninitialized index cannot be operated on with a dim.
enum Rows {
    Empty,
    Ready { dim: usize, data: Vec<f32> },
}

/// Flat-storage vector index plus the parallel document list.
///
/// Not internally synchronized; callers share it behind an `RwLock`
/// (readers: `search`, `save`; writers: `add_documents`, `load`).
pub struct VectorIndex {
    rows: Rows,
    docs: Vec<Document>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            rows: Rows::Empty,
            docs: Vec::new(),
        }
    }

    /// Current document count.
    pub fn count(&self) -> usize {
        self.docs.len()
    }

    /// Dimensionality, once fixed by the first insertion.
    pub fn dim(&self) -> Option<usize> {
        match &self.rows {
            Rows::Empty => None,
            Rows::Ready { dim, .. } => Some(*dim),
        }
    }

    /// Iterate over stored documents in insertion order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    /// Add documents and their vectors to the index.
    ///
    /// Requires one vector per text. Missing `metas` entries are padded
    /// with empty mappings. The first call fixes the index dimension; any
    /// later width disagreement fails without mutating the index. Ids are
    /// assigned contiguously starting at the current count.
    pub fn add_documents(
        &mut self,
        texts: Vec<String>,
        mut metas: Vec<Meta>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<IngestReport, IndexError> {
        if texts.is_empty() {
            return Ok(IngestReport {
                ingested: 0,
                total_docs: self.count(),
            });
        }
        if vectors.len() != texts.len() {
            return Err(IndexError::CountMismatch {
                texts: texts.len(),
                vectors: vectors.len(),
            });
        }

        let width = vectors[0].len();
        for (row, v) in vectors.iter().enumerate() {
            if v.len() != width {
                return Err(IndexError::RaggedVectors {
                    row,
                    expected: width,
                    got: v.len(),
                });
            }
        }
        if let Rows::Ready { dim, .. } = &self.rows {
            if *dim != width {
                return Err(IndexError::DimensionMismatch {
                    expected: *dim,
                    got: width,
                });
            }
        }

        // All checks passed; mutation from here on.
        if metas.len() < texts.len() {
            metas.resize(texts.len(), Meta::new());
        }

        let data = match &mut self.rows {
            Rows::Ready { data, .. } => data,
            rows @ Rows::Empty => {
                *rows = Rows::Ready {
                    dim: width,
                    data: Vec::new(),
                };
                match rows {
                    Rows::Ready { data, .. } => data,
                    Rows::Empty => unreachable!(),
                }
            }
        };

        for v in &vectors {
            let mut row = v.clone();
            l2_normalize(&mut row);
            data.extend_from_slice(&row);
        }

        let start_id = self.docs.len();
        let ingested = texts.len();
        for (i, (text, meta)) in texts.into_iter().zip(metas).enumerate() {
            self.docs.push(Document {
                id: start_id + i,
                text,
                meta,
            });
        }

        Ok(IngestReport {
            ingested,
            total_docs: self.count(),
        })
    }

    /// Top-k cosine-similarity search.
    ///
    /// Returns an empty result on an empty index. `k` is clamped to
    /// `[1, count]`. Ties break by insertion order. The query is normalized
    /// identically to stored vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>, IndexError> {
        let (dim, data) = match &self.rows {
            Rows::Empty => return Ok(Vec::new()),
            Rows::Ready { dim, data } => (*dim, data),
        };
        if self.docs.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != dim {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                got: query.len(),
            });
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let k = k.clamp(1, self.count());

        let mut scored: Vec<(usize, f32)> = data
            .chunks_exact(dim)
            .enumerate()
            .map(|(i, row)| {
                let dot: f32 = row.iter().zip(q.iter()).map(|(a, b)| a * b).sum();
                (i, dot)
            })
            .collect();
        // stable sort keeps insertion order for equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let doc = &self.docs[i];
                Hit {
                    id: doc.id,
                    text: doc.text.clone(),
                    meta: doc.meta.clone(),
                    score,
                }
            })
            .collect())
    }

    /// Persist the index under `dir` as `vectors.bin` + `docs.jsonl`.
    ///
    /// An uninitialized index writes only the (empty) document log, so a
    /// later `load` treats the directory as a cold start.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

        if let Rows::Ready { dim, data } = &self.rows {
            let mut blob = Vec::with_capacity(8 + data.len() * 4);
            blob.extend_from_slice(&(*dim as u64).to_le_bytes());
            for v in data {
                blob.extend_from_slice(&v.to_le_bytes());
            }
            std::fs::write(dir.join(VECTORS_FILE), blob)
                .with_context(|| "Failed to write vector blob")?;
        }

        let mut log = std::fs::File::create(dir.join(DOCS_FILE))
            .with_context(|| "Failed to create document log")?;
        for doc in &self.docs {
            let line = serde_json::to_string(doc)?;
            writeln!(log, "{}", line)?;
        }
        Ok(())
    }

    /// Restore the index from `dir`, replacing the current state wholesale.
    ///
    /// A missing or partial artifact pair leaves the index empty rather
    /// than failing. Artifacts that are present but malformed are an error
    /// and leave the current state untouched.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        let vectors_path = dir.join(VECTORS_FILE);
        let docs_path = dir.join(DOCS_FILE);

        if !vectors_path.exists() || !docs_path.exists() {
            *self = Self::new();
            return Ok(());
        }

        let blob = std::fs::read(&vectors_path)
            .with_context(|| format!("Failed to read {}", vectors_path.display()))?;
        if blob.len() < 8 {
            bail!("vector blob too short: {} bytes", blob.len());
        }
        let dim = u64::from_le_bytes(blob[..8].try_into().expect("checked length")) as usize;
        if dim == 0 {
            bail!("vector blob declares zero dimension");
        }
        let payload = &blob[8..];
        if payload.len() % 4 != 0 {
            bail!("vector blob payload is not a whole number of f32s");
        }
        let data: Vec<f32> = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if data.len() % dim != 0 {
            bail!(
                "vector blob holds {} floats, not a multiple of dim {}",
                data.len(),
                dim
            );
        }
        let row_count = data.len() / dim;

        let content = std::fs::read_to_string(&docs_path)
            .with_context(|| format!("Failed to read {}", docs_path.display()))?;
        let mut docs = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let doc: Document = serde_json::from_str(line)
                .with_context(|| format!("Malformed document record on line {}", n + 1))?;
            docs.push(doc);
        }

        if docs.len() != row_count {
            bail!(
                "document log has {} records but vector blob has {} rows",
                docs.len(),
                row_count
            );
        }

        *self = Self {
            rows: if row_count == 0 {
                Rows::Empty
            } else {
                Rows::Ready { dim, data }
            },
            docs,
        };
        Ok(())
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// L2-normalize a vector in place, epsilon-guarded for zero vectors.
fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt() + NORM_EPSILON;
    for x in v.iter_mut() {
        *x /= norm;
    }
}
