//! Parent-window hybrid retrieval service.
//!
//! Documents are split into small chunks for matching, but every chunk carries
//! the text of its surrounding window (`parent_content`), and that wider text
//! is what queries hand back for grounding.

pub mod answer;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod retriever;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chunk_model::ChunkParams;
use chunking_store::{build_segmenter, DocumentRow, StoreStats, VectorStore};
use embedding_provider::Embedder;
use tracing::info;

pub use answer::{render_prompt, Answer, AnswerContext, Generator, GeneratorError, DEFAULT_PROMPT_TEMPLATE};
pub use config::{RetrievalParams, ServiceConfig};
pub use error::{ErrorKind, IndexFailure, ServiceError};
pub use pipeline::{IngestStage, ProgressEvent, ProgressFn};
pub use retriever::HybridRetriever;

pub struct RagService {
    cfg: ServiceConfig,
    embedder: Arc<dyn Embedder>,
    store: Arc<VectorStore>,
    retriever: HybridRetriever,
    /// Serializes writers within this process.
    write_lock: Mutex<()>,
}

impl RagService {
    /// Bind to `cfg.store_dir`. Nothing is created until the first ingestion.
    pub fn new(cfg: ServiceConfig, embedder: Arc<dyn Embedder>) -> Result<Self, ServiceError> {
        let store = Arc::new(VectorStore::new(cfg.store_dir.clone()));
        let segmenter = build_segmenter(cfg.segmenter)
            .map_err(|e| ServiceError::Configuration { message: format!("segmenter: {e}") })?;
        let retriever = HybridRetriever::new(Arc::clone(&store), Arc::clone(&embedder), segmenter, cfg.retrieval);
        info!(
            store = %cfg.store_dir.display(),
            segmenter = ?cfg.segmenter,
            model = %embedder.info().embedding_model_id,
            "rag service ready"
        );
        Ok(Self { cfg, embedder, store, retriever, write_lock: Mutex::new(()) })
    }

    pub fn config(&self) -> &ServiceConfig { &self.cfg }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    pub fn retriever(&self) -> &HybridRetriever { &self.retriever }

    /// Ingest a `.pdf` or `.docx` file with the configured chunk parameters.
    /// Returns the number of chunks written.
    ///
    /// Re-ingesting a file appends a second copy of its chunks.
    pub fn ingest(&self, path: impl AsRef<Path>) -> Result<usize, ServiceError> {
        let params = self.cfg.chunk;
        self.ingest_with(path, &params, None)
    }

    /// Ingest with explicit parameters and an optional progress callback.
    pub fn ingest_with(
        &self,
        path: impl AsRef<Path>,
        params: &ChunkParams,
        progress: Option<ProgressFn>,
    ) -> Result<usize, ServiceError> {
        let path = path.as_ref().to_string_lossy().into_owned();
        pipeline::Ingestion {
            embedder: self.embedder.as_ref(),
            store: &self.store,
            write_lock: &self.write_lock,
            embed_batch_size: self.cfg.embed_batch_size,
        }
        .run(&path, params, progress)
    }

    /// Run [`RagService::ingest_with`] on a background thread.
    pub fn ingest_in_background(
        self: &Arc<Self>,
        path: impl AsRef<Path>,
        params: ChunkParams,
        progress: Option<ProgressFn>,
    ) -> JoinHandle<Result<usize, ServiceError>> {
        let svc = Arc::clone(self);
        let path = path.as_ref().to_path_buf();
        std::thread::spawn(move || svc.ingest_with(&path, &params, progress))
    }

    /// Deduplicated parent-window texts for `query`, using `k` vector hits.
    /// An empty or absent store yields an empty context.
    pub fn answer_context(&self, query: &str, k: usize) -> Result<AnswerContext, ServiceError> {
        let results = self.retriever.retrieve(query, k)?;
        let contexts = results.iter().map(|r| r.grounding_text().to_string()).collect();
        Ok(AnswerContext { contexts })
    }

    /// Retrieve context and ask `generator` with the default prompt.
    pub fn answer(&self, query: &str, generator: &dyn Generator) -> Result<Answer, ServiceError> {
        self.answer_with_template(query, generator, DEFAULT_PROMPT_TEMPLATE)
    }

    /// Like [`RagService::answer`] with a custom `{text}`/`{question}` template.
    pub fn answer_with_template(
        &self,
        query: &str,
        generator: &dyn Generator,
        template: &str,
    ) -> Result<Answer, ServiceError> {
        let context = self.answer_context(query, self.cfg.retrieval.vector_k)?;
        let prompt = render_prompt(template, &context, query);
        let answer = generator.generate(&prompt)?;
        Ok(Answer { answer, sources: context.contexts })
    }

    /// Ingestion registry, oldest first.
    pub fn list_documents(&self) -> Result<Vec<DocumentRow>, ServiceError> {
        self.store.list_documents().map_err(ServiceError::query)
    }

    pub fn stats(&self) -> Result<StoreStats, ServiceError> {
        self.store.stats().map_err(ServiceError::query)
    }
}
