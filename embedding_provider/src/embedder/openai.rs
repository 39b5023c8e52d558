use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{check_dimension, Embedder, EmbedderError, EmbedderInfo, ProviderKind};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_DIMENSION: usize = 1536;

/// Settings for the OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Read `OPENAI_API_KEY` and the optional `OPENAI_BASE_URL`/`OPENAI_EMBEDDING_MODEL`.
    pub fn from_env() -> Result<Self, EmbedderError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| EmbedderError::InvalidConfiguration {
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Ok(Self {
            api_key,
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.into()),
            model: std::env::var("OPENAI_EMBEDDING_MODEL").unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.into()),
            dimension: DEFAULT_OPENAI_DIMENSION,
            timeout: Duration::from_secs(60),
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Remote embedder calling an OpenAI-compatible API with a blocking client.
#[derive(Debug)]
pub struct OpenAiEmbedder {
    info: EmbedderInfo,
    client: reqwest::blocking::Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiConfig) -> Result<Self, EmbedderError> {
        if config.api_key.is_empty() {
            return Err(EmbedderError::InvalidConfiguration { message: "API key must not be empty".into() });
        }
        if config.dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedderError::InvalidConfiguration { message: format!("http client: {e}") })?;
        Ok(Self {
            info: EmbedderInfo {
                provider: ProviderKind::OpenAi,
                embedding_model_id: config.model,
                dimension: config.dimension,
                text_repr_version: "v1".into(),
            },
            client,
            api_key: config.api_key,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
        })
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedderError::ProviderFailure { message: "API returned empty response".into() })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(batch_size = texts.len(), model = %self.info.embedding_model_id, "openai embedding batch");

        let body = EmbeddingRequest { model: &self.info.embedding_model_id, input: texts };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                error!(error = %e, "openai request failed");
                EmbedderError::ProviderFailure { message: format!("request failed: {e}") }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
            error!(%status, "openai API error");
            return Err(EmbedderError::ProviderFailure { message: format!("API returned {status}: {detail}") });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbedderError::ProviderFailure { message: format!("failed to parse response: {e}") })?;
        if parsed.data.len() != texts.len() {
            return Err(EmbedderError::ProviderFailure {
                message: format!("API returned {} embeddings for {} inputs", parsed.data.len(), texts.len()),
            });
        }
        parsed.data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        for v in &vectors {
            check_dimension(&self.info, v)?;
        }
        Ok(vectors)
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}
