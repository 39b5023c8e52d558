use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use ndarray::Array2;
use ort::{session::Session, value::Tensor, Error as OrtError};
use tokenizers::{Encoding, Tokenizer};
use tracing::debug;

use super::{check_dimension, l2_normalize, Embedder, EmbedderError, EmbedderInfo, ProviderKind};

/// Configuration for a local ONNX sentence-embedding model.
#[derive(Debug, Clone)]
pub struct OnnxStdIoConfig {
    pub model_path: PathBuf,
    pub runtime_library_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimension: usize,
    /// Maximum input length in tokens.
    pub max_input_length: usize,
    pub embedding_model_id: String,
    pub text_repr_version: String,
}

/// Runs a transformer encoder through the ONNX Runtime shared library,
/// mean-pools the last hidden state and L2-normalises the result.
#[derive(Debug)]
pub struct OnnxStdIoEmbedder {
    info: EmbedderInfo,
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    pad_id: i64,
    max_input_length: usize,
}

struct PreparedBatch {
    input_ids: Tensor<i64>,
    attention_mask: Tensor<i64>,
    masks: Vec<Vec<i64>>,
    seq_len: usize,
}

static ORT_RUNTIME_PATH: OnceLock<PathBuf> = OnceLock::new();

impl OnnxStdIoEmbedder {
    pub fn new(config: OnnxStdIoConfig) -> Result<Self, EmbedderError> {
        if config.dimension == 0 || config.max_input_length == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension and max_input_length must be greater than zero".into(),
            });
        }

        let runtime_library_path = resolve_existing_path(&config.runtime_library_path, "ONNX Runtime shared library")?;
        ensure_ort_initialized(&runtime_library_path)?;

        let model_path = resolve_existing_path(&config.model_path, "ONNX model")?;
        let tokenizer_path = resolve_existing_path(&config.tokenizer_path, "tokenizer config")?;

        let session = Session::builder()
            .map_err(|err| map_ort_error("create session builder", err))?
            .commit_from_file(&model_path)
            .map_err(|err| map_ort_error("load ONNX model", err))?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| provider_failure("load tokenizer", err))?;

        // Models differ on the pad token spelling.
        let pad_id = ["<pad>", "[PAD]"]
            .iter()
            .find_map(|t| tokenizer.token_to_id(t))
            .ok_or_else(|| EmbedderError::InvalidConfiguration {
                message: format!("tokenizer `{}` declares no pad token", tokenizer_path.display()),
            })? as i64;

        debug!(model = %model_path.display(), dimension = config.dimension, "onnx embedder loaded");

        Ok(Self {
            info: EmbedderInfo {
                provider: ProviderKind::OnnxStdIo,
                embedding_model_id: config.embedding_model_id,
                dimension: config.dimension,
                text_repr_version: config.text_repr_version,
            },
            session: Mutex::new(session),
            tokenizer,
            pad_id,
            max_input_length: config.max_input_length,
        })
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Encoding>, EmbedderError> {
        let encodings = texts
            .iter()
            .map(|t| self.tokenizer.encode(*t, true))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| provider_failure("tokenize inputs", err))?;

        let max_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        if max_len > self.max_input_length {
            return Err(EmbedderError::InputTooLong {
                max_length: self.max_input_length,
                actual_length: max_len,
            });
        }
        Ok(encodings)
    }

    fn build_inputs(&self, encodings: &[Encoding]) -> Result<PreparedBatch, EmbedderError> {
        let batch = encodings.len();
        let seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);

        let mut input_ids = Array2::<i64>::from_elem((batch, seq_len), self.pad_id);
        let mut attention_mask = Array2::<i64>::zeros((batch, seq_len));
        for (row, encoding) in encodings.iter().enumerate() {
            for (col, (&id, &m)) in encoding.get_ids().iter().zip(encoding.get_attention_mask()).enumerate() {
                input_ids[(row, col)] = id as i64;
                attention_mask[(row, col)] = m as i64;
            }
        }
        let masks = attention_mask.rows().into_iter().map(|r| r.to_vec()).collect();

        Ok(PreparedBatch {
            input_ids: Tensor::from_array(input_ids).map_err(|err| map_ort_error("prepare input_ids", err))?,
            attention_mask: Tensor::from_array(attention_mask)
                .map_err(|err| map_ort_error("prepare attention_mask", err))?,
            masks,
            seq_len,
        })
    }

    /// Execute the model and return `(data, batch, seq_len, hidden)` of the rank-3 output.
    fn run(&self, prepared: PreparedBatch) -> Result<(Vec<f32>, usize, usize, usize), EmbedderError> {
        let mut session = self.session.lock().map_err(|_| EmbedderError::ProviderFailure {
            message: "onnx session lock poisoned".into(),
        })?;
        let outputs = session
            .run(ort::inputs![prepared.input_ids, prepared.attention_mask])
            .map_err(|err| map_ort_error("execute ONNX session", err))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|err| map_ort_error("extract output tensor", err))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        match dims.as_slice() {
            &[batch, seq_len, hidden] => Ok((data.to_vec(), batch, seq_len, hidden)),
            other => Err(EmbedderError::ProviderFailure {
                message: format!("model output must be rank-3 [batch, seq_len, hidden], got {other:?}"),
            }),
        }
    }
}

fn mean_pool(data: &[f32], masks: &[Vec<i64>], seq_len: usize, hidden: usize) -> Vec<Vec<f32>> {
    masks
        .iter()
        .enumerate()
        .map(|(b, mask)| {
            let mut sum = vec![0f32; hidden];
            let mut count = 0f32;
            for (t, &m) in mask.iter().enumerate().take(seq_len) {
                if m == 1 {
                    let base = (b * seq_len + t) * hidden;
                    for (h, s) in sum.iter_mut().enumerate() {
                        *s += data[base + h];
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                sum.iter_mut().for_each(|s| *s /= count);
            }
            l2_normalize(&mut sum);
            sum
        })
        .collect()
}

impl Embedder for OnnxStdIoEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedderError::ProviderFailure { message: "missing pooled output".into() })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = self.encode(texts)?;
        let prepared = self.build_inputs(&encodings)?;
        let masks = prepared.masks.clone();
        let expected_seq_len = prepared.seq_len;

        let (data, batch, seq_len, hidden) = self.run(prepared)?;
        if batch != masks.len() || seq_len != expected_seq_len {
            return Err(EmbedderError::ProviderFailure {
                message: format!(
                    "model returned [{batch}, {seq_len}], expected [{}, {expected_seq_len}]",
                    masks.len()
                ),
            });
        }

        let vectors = mean_pool(&data, &masks, seq_len, hidden);
        for v in &vectors {
            check_dimension(&self.info, v)?;
        }
        Ok(vectors)
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

fn ensure_ort_initialized(runtime_library_path: &Path) -> Result<(), EmbedderError> {
    if let Some(existing) = ORT_RUNTIME_PATH.get() {
        if existing != runtime_library_path {
            return Err(EmbedderError::InvalidConfiguration {
                message: format!(
                    "ONNX Runtime already initialized with `{}`; cannot reinitialize with `{}`",
                    existing.display(),
                    runtime_library_path.display()
                ),
            });
        }
        return Ok(());
    }
    let _ = ORT_RUNTIME_PATH.set(runtime_library_path.to_path_buf());

    ort::init_from(runtime_library_path.to_string_lossy().to_string())
        .with_name("parent-window-rag")
        .commit()
        .map_err(|err| map_ort_error("initialize ONNX Runtime environment", err))?;
    Ok(())
}

fn resolve_existing_path(path: &Path, description: &str) -> Result<PathBuf, EmbedderError> {
    fs::metadata(path).map_err(|_| EmbedderError::InvalidConfiguration {
        message: format!("{description} `{}` does not exist", path.display()),
    })?;
    path.canonicalize().map_err(|err| EmbedderError::ProviderFailure {
        message: format!("failed to canonicalize {description} `{}`: {err}", path.display()),
    })
}

fn map_ort_error(context: &str, err: OrtError) -> EmbedderError {
    EmbedderError::ProviderFailure { message: format!("{context} failed: {err}") }
}

fn provider_failure(context: &str, err: impl std::fmt::Display) -> EmbedderError {
    EmbedderError::ProviderFailure { message: format!("{context} failed: {err}") }
}
