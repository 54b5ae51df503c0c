//! Precomputed passage index served read-only to the retriever.
//!
//! The index file is produced offline; this module only loads and queries
//! it. Queries are embedded with the same feature-hashing scheme the index
//! declares, then ranked by cosine similarity.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::retrieval::{RetrievalError, RetrievedPassage, Retriever};

pub const HASHING_PROVIDER: &str = "hashing";
pub const UNKNOWN_SOURCE: &str = "Unknown";

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("failed to read index file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("index file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported embedding provider '{0}' (only 'hashing' can embed queries locally)")]
    UnsupportedProvider(String),
    #[error("index declares zero embedding dimensions")]
    ZeroDimensions,
    #[error("chunk {index} has {actual} embedding dimensions, index declares {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingProviderInfo {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct IndexFile {
    provider: EmbeddingProviderInfo,
    #[serde(default)]
    chunks: Vec<IndexFileChunk>,
}

#[derive(Debug, Deserialize)]
struct IndexFileChunk {
    text: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    embedding: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    text: String,
    source_id: String,
    embedding: Vec<f64>,
}

/// Signed feature hashing over lowercase word tokens, L2-normalized.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0_f64; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }

        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in word_tokens(text) {
            *counts.entry(token).or_insert(0) += 1;
        }

        for (token, count) in counts {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimensions;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign * f64::from(count);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn word_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|raw| raw.trim_matches('\'').to_lowercase())
        .filter(|token| !token.is_empty())
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0, 0.0, 0.0), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Reduce a stored source path to the document's file name.
fn source_id(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.rsplit(['/', '\\']).next())
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string()
}

/// Immutable after load; share it as `Arc<VectorIndex>` across requests.
#[derive(Debug)]
pub struct VectorIndex {
    provider: EmbeddingProviderInfo,
    embedder: HashingEmbedder,
    chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let raw = std::fs::read_to_string(path).map_err(|source| IndexError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let index = Self::from_json_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            chunks = index.len(),
            model = %index.provider.model,
            "loaded passage index"
        );
        Ok(index)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, IndexError> {
        let file: IndexFile = serde_json::from_str(raw)?;
        if file.provider.provider != HASHING_PROVIDER {
            return Err(IndexError::UnsupportedProvider(file.provider.provider));
        }
        if file.provider.dimensions == 0 {
            return Err(IndexError::ZeroDimensions);
        }

        let embedder = HashingEmbedder::new(file.provider.dimensions);
        let mut chunks = Vec::with_capacity(file.chunks.len());
        for (index, chunk) in file.chunks.into_iter().enumerate() {
            let embedding = match chunk.embedding {
                Some(stored) if stored.len() != embedder.dimensions() => {
                    return Err(IndexError::DimensionMismatch {
                        index,
                        expected: embedder.dimensions(),
                        actual: stored.len(),
                    });
                }
                Some(stored) => stored,
                None => embedder.embed(&chunk.text),
            };
            chunks.push(IndexedChunk {
                source_id: source_id(chunk.source.as_deref()),
                text: chunk.text,
                embedding,
            });
        }

        Ok(Self {
            provider: file.provider,
            embedder,
            chunks,
        })
    }

    pub fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top `k` chunks by cosine similarity; ties keep index order.
    pub fn search(&self, query: &str, k: usize) -> Vec<RetrievedPassage> {
        if k == 0 || self.chunks.is_empty() {
            return Vec::new();
        }

        let query_embedding = self.embedder.embed(query);
        let mut scored: Vec<(usize, f64)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, cosine_similarity(&query_embedding, &chunk.embedding)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, _)| {
                let chunk = &self.chunks[i];
                RetrievedPassage::new(chunk.text.clone(), chunk.source_id.clone())
            })
            .collect()
    }
}

#[async_trait]
impl Retriever for VectorIndex {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        Ok(self.search(query, k))
    }
}
