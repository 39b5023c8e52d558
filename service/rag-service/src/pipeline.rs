//! Document ingestion: read, split, window, embed, store.

use std::sync::Mutex;

use chunk_model::{ChunkParams, ChunkRecord, MAX_CHUNK_CHARS};
use chunking_store::{DocumentRow, VectorStore};
use embedding_provider::{Embedder, EmbedderError};
use file_chunker::DocumentKind;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, ServiceError};

/// Where an ingestion currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    Split,
    Windowed,
    Indexed,
}

/// Progress events emitted during ingestion. A failure at any stage ends the
/// stream with [`ProgressEvent::Failed`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage { stage: IngestStage, chunks: usize },
    EmbedBatch { done: usize, total: usize, batch: usize },
    Failed { kind: ErrorKind, message: String },
}

pub type ProgressFn = Box<dyn FnMut(ProgressEvent) + Send>;

pub(crate) struct Ingestion<'a> {
    pub embedder: &'a dyn Embedder,
    pub store: &'a VectorStore,
    pub write_lock: &'a Mutex<()>,
    pub embed_batch_size: usize,
}

impl Ingestion<'_> {
    /// Run the pipeline for one file. Nothing is written unless every stage succeeds.
    pub fn run(&self, path: &str, params: &ChunkParams, mut progress: Option<ProgressFn>) -> Result<usize, ServiceError> {
        let result = self.run_stages(path, params, &mut progress);
        if let Err(err) = &result {
            warn!(path, error = %err, "ingestion failed");
            emit(&mut progress, ProgressEvent::Failed { kind: err.kind(), message: err.to_string() });
        }
        result
    }

    fn run_stages(&self, path: &str, params: &ChunkParams, progress: &mut Option<ProgressFn>) -> Result<usize, ServiceError> {
        let kind = DocumentKind::from_path(path)?;
        emit(progress, ProgressEvent::Stage { stage: IngestStage::Received, chunks: 0 });

        let split = file_chunker::split_document(path, kind, params)?;
        emit(progress, ProgressEvent::Stage { stage: IngestStage::Split, chunks: split.chunks.len() });

        let out = split.into_windowed(params.window_size);
        if out.capped > 0 {
            debug!(path, capped = out.capped, max_chars = MAX_CHUNK_CHARS, "chunk texts truncated");
        }
        let chunks = out.chunks;
        emit(progress, ProgressEvent::Stage { stage: IngestStage::Windowed, chunks: chunks.len() });

        let vectors = self.embed_chunks(&chunks, progress)?;

        let doc = DocumentRow {
            doc_id: out.doc_id.0,
            source_uri: path.to_string(),
            content_sha256: out.content_sha256,
            chunk_count: chunks.len(),
            ingested_at: String::new(),
        };
        let written = {
            let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.store.upsert(&doc, &chunks, &vectors).map_err(ServiceError::write)?
        };
        info!(path, chunks = written, "document ingested");
        emit(progress, ProgressEvent::Stage { stage: IngestStage::Indexed, chunks: written });
        Ok(written)
    }

    /// Embed chunk texts in batches of `embed_batch_size`. Provider failures
    /// surface as [`ServiceError::IndexWrite`].
    fn embed_chunks(&self, chunks: &[ChunkRecord], progress: &mut Option<ProgressFn>) -> Result<Vec<Vec<f32>>, ServiceError> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let bsz = self.embed_batch_size.max(1);
        let mut out: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        let mut done = 0usize;
        for batch in texts.chunks(bsz) {
            let vecs = self.embedder.embed_batch(batch).map_err(ServiceError::write)?;
            if vecs.len() != batch.len() {
                return Err(ServiceError::write(EmbedderError::ProviderFailure {
                    message: format!("embedder returned {} vectors for {} texts", vecs.len(), batch.len()),
                }));
            }
            out.extend(vecs);
            done += batch.len();
            emit(progress, ProgressEvent::EmbedBatch { done, total: texts.len(), batch: batch.len() });
        }
        Ok(out)
    }
}

fn emit(progress: &mut Option<ProgressFn>, event: ProgressEvent) {
    if let Some(cb) = progress.as_deref_mut() {
        cb(event);
    }
}
