use std::path::PathBuf;

use chunk_model::ChunkParams;
use chunking_store::SegmenterKind;

/// How many results each retrieval path contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalParams {
    pub vector_k: usize,
    pub lexical_k: usize,
    /// HNSW candidate multiplier, see [`chunking_store::SearchOptions`].
    pub fetch_factor: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self { vector_k: 5, lexical_k: 5, fetch_factor: 10 }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding the persistent store; created on first ingestion.
    pub store_dir: PathBuf,
    pub chunk: ChunkParams,
    pub retrieval: RetrievalParams,
    /// Max number of chunks to embed per batch to control memory usage.
    pub embed_batch_size: usize,
    pub segmenter: SegmenterKind,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("target/rag/store"),
            chunk: ChunkParams::default(),
            retrieval: RetrievalParams::default(),
            embed_batch_size: 64,
            segmenter: SegmenterKind::Unicode,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid value `{value}` for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: &'static str,
}

impl ServiceConfig {
    /// Defaults overridden by `RAG_STORE_DIR`, `RAG_CHUNK_SIZE`,
    /// `RAG_CHUNK_OVERLAP`, `RAG_WINDOW_SIZE`, `RAG_EMBED_BATCH`,
    /// `RAG_LEXICAL_K` and `RAG_SEGMENTER`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServiceConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(dir) = lookup("RAG_STORE_DIR") {
            cfg.store_dir = PathBuf::from(dir);
        }
        if let Some(n) = parse_usize(&lookup, "RAG_CHUNK_SIZE")? {
            cfg.chunk.chunk_size = n;
        }
        if let Some(n) = parse_usize(&lookup, "RAG_CHUNK_OVERLAP")? {
            cfg.chunk.chunk_overlap = n;
        }
        if let Some(n) = parse_usize(&lookup, "RAG_WINDOW_SIZE")? {
            cfg.chunk.window_size = n;
        }
        if let Some(n) = parse_usize(&lookup, "RAG_EMBED_BATCH")? {
            cfg.embed_batch_size = n.max(1);
        }
        if let Some(n) = parse_usize(&lookup, "RAG_LEXICAL_K")? {
            cfg.retrieval.lexical_k = n;
        }
        if let Some(v) = lookup("RAG_SEGMENTER") {
            cfg.segmenter = SegmenterKind::parse(&v).ok_or(ConfigError {
                var: "RAG_SEGMENTER",
                value: v,
                reason: "expected `unicode`, `lindera` or `chinese`",
            })?;
        }
        Ok(cfg)
    }
}

fn parse_usize<F>(lookup: &F, var: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError { var, value: v, reason: "expected a non-negative integer" }),
    }
}
