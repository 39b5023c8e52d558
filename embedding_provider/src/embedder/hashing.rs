use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

use super::{l2_normalize, Embedder, EmbedderError, EmbedderInfo, ProviderKind};

/// Configuration for [`HashingEmbedder`].
#[derive(Debug, Clone)]
pub struct HashingConfig {
    pub dimension: usize,
    /// Maximum input length in characters.
    pub max_input_length: usize,
    pub embedding_model_id: String,
    pub text_repr_version: String,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            max_input_length: 32_768,
            embedding_model_id: "hashing-unicode-words".into(),
            text_repr_version: "v1".into(),
        }
    }
}

/// Offline embedder: lowercased Unicode words are hashed into `dimension`
/// buckets as term counts, then L2-normalised.
///
/// Buckets come from SHA-256 over a seed derived from the model id and text
/// representation version, so stored vectors stay valid across builds.
///
/// Texts sharing words get a positive cosine similarity; a text with no words
/// embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    info: EmbedderInfo,
    max_input_length: usize,
    seed: [u8; 32],
}

impl HashingEmbedder {
    pub fn new(config: HashingConfig) -> Result<Self, EmbedderError> {
        if config.dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        if config.max_input_length == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "max_input_length must be greater than zero".into(),
            });
        }

        let mut hasher = Sha256::new();
        hasher.update(config.embedding_model_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(config.text_repr_version.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&hasher.finalize());

        Ok(Self {
            info: EmbedderInfo {
                provider: ProviderKind::Hashing,
                embedding_model_id: config.embedding_model_id,
                dimension: config.dimension,
                text_repr_version: config.text_repr_version,
            },
            max_input_length: config.max_input_length,
            seed,
        })
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::new().chain_update(self.seed).chain_update(token.as_bytes()).finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(head) % self.info.dimension as u64) as usize
    }

    fn validate_length(&self, text: &str) -> Result<(), EmbedderError> {
        let actual_length = text.chars().count();
        if actual_length > self.max_input_length {
            return Err(EmbedderError::InputTooLong {
                max_length: self.max_input_length,
                actual_length,
            });
        }
        Ok(())
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.validate_length(text)?;
        let mut v = vec![0f32; self.info.dimension];
        for word in text.unicode_words() {
            let token = word.to_lowercase();
            v[self.bucket(&token)] += 1.0;
        }
        l2_normalize(&mut v);
        Ok(v)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}
