//! Persistent chunk storage plus the two retrieval indexes built on it.
//!
//! [`VectorStore`] owns the on-disk SQLite store and a resident HNSW graph;
//! [`Bm25Index`] is rebuilt from a store snapshot for every lexical query.

pub mod sqlite_repo;
pub mod hnsw_index;
pub mod vector_store;
pub mod segmenter;
pub mod bm25_index;

pub use bm25_index::{Bm25Index, Bm25Params};
pub use segmenter::{build_segmenter, SegmenterKind, TextSegmenter, UnicodeSegmenter};
pub use vector_store::VectorStore;

use serde::{Deserialize, Serialize};

/// One row of the document registry, written alongside a document's chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub doc_id: String,
    pub source_uri: String,
    pub content_sha256: Option<String>,
    pub chunk_count: usize,
    /// RFC 3339 timestamp; filled in by the store when empty.
    pub ingested_at: String,
}

/// Row counts of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub top_k: usize,
    /// Multiplier applied to `top_k` to size the HNSW candidate list.
    pub fetch_factor: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions { top_k: 5, fetch_factor: 10 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("embedding dimension mismatch: store holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("batch has {chunks} chunks but {vectors} vectors")]
    BatchMismatch { chunks: usize, vectors: usize },
    #[error("corrupt store: {0}")]
    Corrupt(String),
    #[cfg(feature = "lindera")]
    #[error("segmenter error: {0}")]
    Segmenter(String),
}
