use chunking_store::StoreError;
use embedding_provider::EmbedderError;
use file_chunker::ChunkError;

use crate::answer::GeneratorError;
use crate::config::ConfigError;

/// Coarse classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedFormat,
    EmptyDocument,
    EmptyAfterSplit,
    Extraction,
    IndexWrite,
    IndexQuery,
    Generation,
    Configuration,
}

/// Underlying cause of an index read or write failure.
#[derive(Debug, thiserror::Error)]
pub enum IndexFailure {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IndexFailure {
    /// True when the failure may clear up on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexFailure::Embedding(e) => e.is_transient(),
            IndexFailure::Store(e) => !matches!(
                e,
                StoreError::DimensionMismatch { .. } | StoreError::BatchMismatch { .. } | StoreError::Corrupt(_)
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unsupported document format `{extension}`: upload a .pdf or .docx file")]
    UnsupportedFormat { extension: String },
    #[error("document `{path}` has no extractable text")]
    EmptyDocument { path: String },
    #[error("document `{path}` produced no chunks (chunk_size={chunk_size}, chunk_overlap={chunk_overlap})")]
    EmptyAfterSplit { path: String, chunk_size: usize, chunk_overlap: usize },
    #[error("failed to extract text from `{path}`: {message}")]
    Extraction { path: String, message: String },
    /// The write is one transaction, so nothing was committed. A retry after a
    /// caller-side timeout that raced a successful commit duplicates the document.
    #[error("index write failed: {0}")]
    IndexWrite(#[source] IndexFailure),
    #[error("index query failed: {0}")]
    IndexQuery(#[source] IndexFailure),
    #[error("generation failed: {0}")]
    Generation(#[from] GeneratorError),
    #[error("invalid configuration: {message}")]
    Configuration { message: String },
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            ServiceError::EmptyDocument { .. } => ErrorKind::EmptyDocument,
            ServiceError::EmptyAfterSplit { .. } => ErrorKind::EmptyAfterSplit,
            ServiceError::Extraction { .. } => ErrorKind::Extraction,
            ServiceError::IndexWrite(_) => ErrorKind::IndexWrite,
            ServiceError::IndexQuery(_) => ErrorKind::IndexQuery,
            ServiceError::Generation(_) => ErrorKind::Generation,
            ServiceError::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// True for infrastructure failures that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::IndexWrite(e) | ServiceError::IndexQuery(e) => e.is_transient(),
            ServiceError::Generation(_) => true,
            _ => false,
        }
    }
}

impl From<ChunkError> for ServiceError {
    fn from(err: ChunkError) -> Self {
        match err {
            ChunkError::UnsupportedFormat { extension } => ServiceError::UnsupportedFormat { extension },
            ChunkError::EmptyDocument { path } => ServiceError::EmptyDocument { path },
            ChunkError::EmptyAfterSplit { path, chunk_size, chunk_overlap } => {
                ServiceError::EmptyAfterSplit { path, chunk_size, chunk_overlap }
            }
            ChunkError::Extraction { path, message } => ServiceError::Extraction { path, message },
        }
    }
}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        ServiceError::Configuration { message: err.to_string() }
    }
}

impl ServiceError {
    pub(crate) fn write(err: impl Into<IndexFailure>) -> Self {
        ServiceError::IndexWrite(err.into())
    }

    pub(crate) fn query(err: impl Into<IndexFailure>) -> Self {
        ServiceError::IndexQuery(err.into())
    }
}
