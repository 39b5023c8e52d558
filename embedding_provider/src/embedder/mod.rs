use thiserror::Error;

mod hashing;
#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "openai")]
mod openai;

pub use hashing::{HashingConfig, HashingEmbedder};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxStdIoConfig, OnnxStdIoEmbedder};
#[cfg(feature = "openai")]
pub use openai::{OpenAiConfig, OpenAiEmbedder};

/// Identifies the backing implementation that powers an embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Hashing,
    OnnxStdIo,
    OpenAi,
}

/// Static metadata describing a particular embedder instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub provider: ProviderKind,
    pub embedding_model_id: String,
    pub dimension: usize,
    pub text_repr_version: String,
}

/// Errors that can be produced by embedder operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmbedderError {
    #[error("invalid embedder configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("input text exceeds max length of {max_length}, actual length: {actual_length}")]
    InputTooLong {
        max_length: usize,
        actual_length: usize,
    },
    #[error("provider failure: {message}")]
    ProviderFailure { message: String },
}

impl EmbedderError {
    /// Remote and runtime failures may succeed on retry; bad input or config will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbedderError::ProviderFailure { .. })
    }
}

/// Core interface for all embedder implementations.
///
/// Implementations are deterministic for a fixed model, and every returned
/// vector has exactly `info().dimension` components.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;
    fn info(&self) -> &EmbedderInfo;
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Reject a vector whose length disagrees with the embedder's declared dimension.
#[cfg(any(feature = "onnx", feature = "openai"))]
pub(crate) fn check_dimension(info: &EmbedderInfo, vector: &[f32]) -> Result<(), EmbedderError> {
    if vector.len() != info.dimension {
        return Err(EmbedderError::ProviderFailure {
            message: format!(
                "embedding dimension {} does not match configured dimension {}",
                vector.len(),
                info.dimension
            ),
        });
    }
    Ok(())
}
