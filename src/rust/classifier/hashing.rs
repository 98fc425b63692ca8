use ndarray::Array1;

use super::embedding::TextEmbedding;
use super::error::ClassifierError;
use super::utils::normalize_vector;

const DEFAULT_DIMENSION: usize = 384;
const CHAR_NGRAM: usize = 3;
const CHAR_NGRAM_WEIGHT: f32 = 0.5;
const BIGRAM_WEIGHT: f32 = 0.75;

/// Deterministic, model-free embedder based on signed feature hashing.
///
/// Each text is lowercased and split on non-alphanumeric characters. Word unigrams,
/// word bigrams and boundary-marked character trigrams are hashed into a fixed number
/// of buckets with a hash-derived sign, and the result is L2-normalised. Text without
/// any alphanumeric token is hashed by its character trigrams alone. No training
/// or download is required, which makes it suitable for offline use and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("hashing-{}", dimension),
        }
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.dimension == 0 {
            return Err(ClassifierError::BuildError("Hashing dimension must be positive".into()));
        }
        Ok(())
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    fn add_char_ngrams(&self, vector: &mut Array1<f32>, token: &str) {
        let chars: Vec<char> = format!("<{}>", token).chars().collect();
        for gram in chars.windows(CHAR_NGRAM) {
            let gram: String = gram.iter().collect();
            self.add_feature(vector, &format!("c:{}", gram), CHAR_NGRAM_WEIGHT);
        }
    }

    fn add_feature(&self, vector: &mut Array1<f32>, feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl TextEmbedding for HashingEmbedder {
    fn embed_text(&self, text: &str) -> Result<Array1<f32>, ClassifierError> {
        self.validate()?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ClassifierError::ValidationError("Input text cannot be empty".into()));
        }

        let mut vector = Array1::<f32>::zeros(self.dimension);
        let tokens = Self::tokens(trimmed);
        if tokens.is_empty() {
            // Punctuation or symbols only: character trigrams of the raw text
            self.add_char_ngrams(&mut vector, &trimmed.to_lowercase());
            return Ok(normalize_vector(&vector));
        }

        for token in &tokens {
            self.add_feature(&mut vector, &format!("w:{}", token), 1.0);
            self.add_char_ngrams(&mut vector, token);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("b:{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        Ok(normalize_vector(&vector))
    }

    fn embedding_size(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// FNV-1a, 64-bit. Stable across platforms and releases, unlike std's hasher.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
