use std::sync::Arc;

use tracing::info;

use crate::embedder::{Embedder, EmbedderError, HashingConfig, HashingEmbedder};

/// Which embedder backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderBackend {
    Hashing,
    Onnx,
    OpenAi,
}

impl EmbedderBackend {
    pub fn parse(value: &str) -> Result<Self, EmbedderError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hashing" | "hash" => Ok(Self::Hashing),
            "onnx" => Ok(Self::Onnx),
            "openai" => Ok(Self::OpenAi),
            other => Err(EmbedderError::InvalidConfiguration {
                message: format!("unknown embedder backend `{other}` (expected hashing, onnx or openai)"),
            }),
        }
    }
}

/// Default asset locations for the local ONNX embedder.
#[derive(Debug, Clone, Copy)]
pub struct OnnxDefaults {
    pub model_path: &'static str,
    pub tokenizer_path: &'static str,
    pub runtime_library_path: &'static str,
    pub embedding_dimension: usize,
    pub max_input_tokens: usize,
    pub embedding_model_id: &'static str,
}

pub const ONNX_DEFAULTS: OnnxDefaults = OnnxDefaults {
    model_path: "models/multilingual-e5-small/model.onnx",
    tokenizer_path: "models/multilingual-e5-small/tokenizer.json",
    runtime_library_path: "bin/onnxruntime/lib/libonnxruntime.so",
    embedding_dimension: 384,
    max_input_tokens: 512,
    embedding_model_id: "multilingual-e5-small",
};

/// Embedder selection, usually read from the environment.
///
/// | variable              | meaning                                   |
/// |-----------------------|-------------------------------------------|
/// | `RAG_EMBEDDER`        | `hashing` (default), `onnx` or `openai`   |
/// | `RAG_EMBED_DIM`       | hashing embedder dimension                |
/// | `RAG_ONNX_MODEL`      | ONNX model path                           |
/// | `RAG_ONNX_TOKENIZER`  | tokenizer.json path                       |
/// | `RAG_ONNX_RUNTIME`    | ONNX Runtime shared library path          |
#[derive(Debug, Clone)]
pub struct EmbedderSettings {
    pub backend: EmbedderBackend,
    pub hashing: HashingConfig,
    pub onnx_model_path: String,
    pub onnx_tokenizer_path: String,
    pub onnx_runtime_path: String,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            backend: EmbedderBackend::Hashing,
            hashing: HashingConfig::default(),
            onnx_model_path: ONNX_DEFAULTS.model_path.into(),
            onnx_tokenizer_path: ONNX_DEFAULTS.tokenizer_path.into(),
            onnx_runtime_path: ONNX_DEFAULTS.runtime_library_path.into(),
        }
    }
}

impl EmbedderSettings {
    pub fn from_env() -> Result<Self, EmbedderError> {
        let mut settings = Self::default();
        if let Ok(v) = std::env::var("RAG_EMBEDDER") {
            settings.backend = EmbedderBackend::parse(&v)?;
        }
        if let Ok(v) = std::env::var("RAG_EMBED_DIM") {
            settings.hashing.dimension = v.parse().map_err(|_| EmbedderError::InvalidConfiguration {
                message: format!("RAG_EMBED_DIM must be a positive integer, got `{v}`"),
            })?;
        }
        if let Ok(v) = std::env::var("RAG_ONNX_MODEL") {
            settings.onnx_model_path = v;
        }
        if let Ok(v) = std::env::var("RAG_ONNX_TOKENIZER") {
            settings.onnx_tokenizer_path = v;
        }
        if let Ok(v) = std::env::var("RAG_ONNX_RUNTIME") {
            settings.onnx_runtime_path = v;
        }
        Ok(settings)
    }
}

/// Construct the configured embedder. Backends compiled out report a configuration error.
pub fn build_embedder(settings: &EmbedderSettings) -> Result<Arc<dyn Embedder>, EmbedderError> {
    let embedder: Arc<dyn Embedder> = match settings.backend {
        EmbedderBackend::Hashing => Arc::new(HashingEmbedder::new(settings.hashing.clone())?),
        EmbedderBackend::Onnx => build_onnx(settings)?,
        EmbedderBackend::OpenAi => build_openai()?,
    };
    let meta = embedder.info();
    info!(provider = ?meta.provider, model = %meta.embedding_model_id, dimension = meta.dimension, "embedder ready");
    Ok(embedder)
}

#[cfg(feature = "onnx")]
fn build_onnx(settings: &EmbedderSettings) -> Result<Arc<dyn Embedder>, EmbedderError> {
    use crate::embedder::{OnnxStdIoConfig, OnnxStdIoEmbedder};
    let config = OnnxStdIoConfig {
        model_path: settings.onnx_model_path.clone().into(),
        runtime_library_path: settings.onnx_runtime_path.clone().into(),
        tokenizer_path: settings.onnx_tokenizer_path.clone().into(),
        dimension: ONNX_DEFAULTS.embedding_dimension,
        max_input_length: ONNX_DEFAULTS.max_input_tokens,
        embedding_model_id: ONNX_DEFAULTS.embedding_model_id.into(),
        text_repr_version: "v1".into(),
    };
    Ok(Arc::new(OnnxStdIoEmbedder::new(config)?))
}

#[cfg(not(feature = "onnx"))]
fn build_onnx(_settings: &EmbedderSettings) -> Result<Arc<dyn Embedder>, EmbedderError> {
    Err(EmbedderError::InvalidConfiguration {
        message: "onnx backend requested but the `onnx` feature is not enabled".into(),
    })
}

#[cfg(feature = "openai")]
fn build_openai() -> Result<Arc<dyn Embedder>, EmbedderError> {
    use crate::embedder::{OpenAiConfig, OpenAiEmbedder};
    Ok(Arc::new(OpenAiEmbedder::new(OpenAiConfig::from_env()?)?))
}

#[cfg(not(feature = "openai"))]
fn build_openai() -> Result<Arc<dyn Embedder>, EmbedderError> {
    Err(EmbedderError::InvalidConfiguration {
        message: "openai backend requested but the `openai` feature is not enabled".into(),
    })
}
