//! Per-session vector index types.
//!
//! An index is a flat list of embedded chunks persisted as JSON. Retrieval is
//! an exhaustive cosine-similarity scan; documents small enough to upload over
//! HTTP never produce enough chunks to justify an approximate structure.

mod store;

pub use store::VectorIndexStore;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised by the index store.
#[derive(Debug, Error)]
pub enum IndexError {
    /// No persisted index exists for the session and no chunks were supplied.
    #[error("no index exists for this session")]
    NotFound,
    /// Building an index requires at least one chunk.
    #[error("cannot build an index from zero chunks")]
    EmptyBuild,
    /// Index file could not be read or written.
    #[error("index storage failed at {path}: {source}")]
    Storage {
        /// Path of the index file involved.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Persisted index file exists but could not be decoded.
    #[error("index file at {path} is corrupt: {source}")]
    Corrupt {
        /// Path of the index file involved.
        path: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

/// A single embedded chunk stored in an index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Chunk text content.
    pub text: String,
    /// Stable digest of the text, used for dedupe during ingestion.
    pub chunk_hash: String,
    /// Embedding vector for the text.
    pub vector: Vec<f32>,
}

/// A retrieval hit returned by [`VectorIndex::top_k`].
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Chunk text content.
    pub text: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Queryable, serde-persisted representation of one ingested document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    /// Dimensionality every stored vector must share.
    pub dimension: usize,
    /// RFC 3339 build timestamp.
    pub created_at: String,
    /// Embedded chunks in document order.
    pub chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Build an index from embedded chunks.
    pub fn build(dimension: usize, chunks: Vec<IndexedChunk>) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyBuild);
        }
        Ok(Self {
            dimension,
            created_at: current_timestamp_rfc3339(),
            chunks,
        })
    }

    /// Return the `k` chunks most similar to the query vector, best first.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                text: chunk.text.clone(),
                score: cosine_similarity(query, &chunk.vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

/// Stable digest of chunk text used for within-document dedupe.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn current_timestamp_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
