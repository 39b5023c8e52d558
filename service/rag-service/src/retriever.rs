use std::collections::HashSet;
use std::sync::Arc;

use chunk_model::RetrievalResult;
use chunking_store::{Bm25Index, Bm25Params, SearchOptions, TextSegmenter, VectorStore};
use embedding_provider::Embedder;
use tracing::debug;

use crate::config::RetrievalParams;
use crate::error::ServiceError;

/// Vector plus lexical retrieval over one store, merged by grounding text.
pub struct HybridRetriever {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    segmenter: Box<dyn TextSegmenter>,
    params: RetrievalParams,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        segmenter: Box<dyn TextSegmenter>,
        params: RetrievalParams,
    ) -> Self {
        Self { store, embedder, segmenter, params }
    }

    pub fn params(&self) -> &RetrievalParams { &self.params }

    /// Nearest chunks to the query embedding. Embedding failures surface as
    /// [`ServiceError::IndexQuery`].
    pub fn vector_search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>, ServiceError> {
        if k == 0 || !self.store.exists() {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).map_err(ServiceError::query)?;
        let opts = SearchOptions { top_k: k, fetch_factor: self.params.fetch_factor };
        self.store.query(&vector, &opts).map_err(ServiceError::query)
    }

    /// BM25 over a fresh snapshot of every stored chunk.
    pub fn lexical_search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>, ServiceError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let snapshot = self.store.snapshot().map_err(ServiceError::query)?;
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }
        let index = Bm25Index::build(snapshot, self.segmenter.as_ref(), Bm25Params::default());
        Ok(index
            .search(query, self.segmenter.as_ref(), k)
            .into_iter()
            .map(|(result, _score)| result)
            .collect())
    }

    /// Vector hits (`k`) then lexical hits (`lexical_k`), deduplicated by grounding text.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>, ServiceError> {
        let vector = self.vector_search(query, k)?;
        let lexical = self.lexical_search(query, self.params.lexical_k)?;
        let (nv, nl) = (vector.len(), lexical.len());
        let merged = merge_unique(vector, lexical);
        debug!(vector = nv, lexical = nl, merged = merged.len(), "hybrid retrieval");
        Ok(merged)
    }
}

/// Concatenate both lists and keep the first result for each grounding text.
pub fn merge_unique(vector: Vec<RetrievalResult>, lexical: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut seen: HashSet<String> = HashSet::new();
    vector
        .into_iter()
        .chain(lexical)
        .filter(|r| seen.insert(r.grounding_text().to_string()))
        .collect()
}
