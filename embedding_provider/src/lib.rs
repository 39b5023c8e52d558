//! Text embedders used by the ingestion pipeline and the query path.
//!
//! Every provider implements [`embedder::Embedder`]; the same instance must be
//! used for indexing and querying so vectors stay comparable.

pub mod config;
pub mod embedder;

pub use embedder::{Embedder, EmbedderError, EmbedderInfo, HashingConfig, HashingEmbedder, ProviderKind};
