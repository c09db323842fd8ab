//! Feature-hashing encoder.
//!
//! A deterministic, model-free encoder: text is lower-cased and split into
//! alphanumeric tokens, each token and each adjacent token pair is hashed
//! (FNV-1a) into a signed bucket, and the result is L2-normalised. Texts
//! sharing vocabulary get high cosine similarity. Good enough for offline
//! use and tests; swap in a learned model for real semantic matching.

use async_trait::async_trait;

use crate::encoder::{Encoder, EncoderProvider, Result, SharedEncoder};

/// Default number of hash buckets.
pub const DEFAULT_DIMENSION: usize = 384;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Bag-of-words encoder using the hashing trick.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimension: usize,
    name: String,
}

impl Default for HashingEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEncoder {
    /// Create an encoder with `dimension` buckets (at least 1).
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            name: format!("hashing-{}", dimension),
        }
    }

    /// Encode one text synchronously.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = tokenize(text);

        for token in &tokens {
            self.add_feature(&mut vector, token.as_bytes(), 1.0);
        }
        // bigrams carry a little word-order signal
        for pair in tokens.windows(2) {
            let feature = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vector, feature.as_bytes(), 0.5);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        // the top bit picks the sign so collisions tend to cancel out
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl Encoder for HashingEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

/// Provider for [`HashingEncoder`]; acquisition cannot fail.
#[derive(Debug, Clone, Default)]
pub struct HashingEncoderProvider {
    dimension: usize,
}

impl HashingEncoderProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EncoderProvider for HashingEncoderProvider {
    async fn acquire(&self) -> Result<SharedEncoder> {
        let dimension = if self.dimension == 0 {
            DEFAULT_DIMENSION
        } else {
            self.dimension
        };
        Ok(std::sync::Arc::new(HashingEncoder::new(dimension)))
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}
