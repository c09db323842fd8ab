//! Text encoder abstraction.
//!
//! An [`Encoder`] turns strings into fixed-length vectors. One encoder
//! instance produces every vector in a published index, including the query
//! vectors compared against it, so vectors from different models are never
//! mixed. Encoders are obtained through an [`EncoderProvider`], which is
//! where slow model loading or connectivity checks happen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

/// Error type for encoder operations.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// The encoder could not be obtained (model missing, server down).
    #[error("Encoder unavailable: {0}")]
    Unavailable(String),
    /// Transport failure talking to a remote encoder.
    #[error("Network error: {0}")]
    Network(String),
    /// The encoder answered with something unexpected.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// A batch call returned the wrong number of vectors.
    #[error("Encoder returned {actual} vectors for {expected} inputs")]
    BatchMismatch { expected: usize, actual: usize },
    #[error("Encoding failed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, EncoderError>;

/// Maps text to embedding vectors.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Model identifier, used in logs.
    fn name(&self) -> &str;

    /// Length of every vector this encoder produces.
    fn dimension(&self) -> usize;

    /// Encode a batch of texts, returning one vector per input, in order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Encode a single text.
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.encode_batch(&[text.to_string()]).await?;
        let mut vectors = check_batch(1, vectors)?;
        Ok(vectors.remove(0))
    }
}

/// Thread-safe handle to an encoder.
pub type SharedEncoder = Arc<dyn Encoder>;

/// Obtains an encoder, possibly slowly.
#[async_trait]
pub trait EncoderProvider: Send + Sync {
    /// Acquire a ready-to-use encoder.
    ///
    /// Returns [`EncoderError::Unavailable`] (or another error) when no
    /// encoder can be produced.
    async fn acquire(&self) -> Result<SharedEncoder>;
}

/// Check that a batch call produced one vector per input.
pub fn check_batch(expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(EncoderError::BatchMismatch {
            expected,
            actual: vectors.len(),
        });
    }
    Ok(vectors)
}

// ============================================================================
// Providers
// ============================================================================

/// Provider that hands out an already constructed encoder.
pub struct StaticEncoderProvider {
    encoder: SharedEncoder,
}

impl StaticEncoderProvider {
    pub fn new(encoder: SharedEncoder) -> Self {
        Self { encoder }
    }
}

#[async_trait]
impl EncoderProvider for StaticEncoderProvider {
    async fn acquire(&self) -> Result<SharedEncoder> {
        Ok(self.encoder.clone())
    }
}

/// Provider that never produces an encoder.
pub struct FailingEncoderProvider {
    reason: String,
    attempts: AtomicUsize,
}

impl FailingEncoderProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of times `acquire` was called.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EncoderProvider for FailingEncoderProvider {
    async fn acquire(&self) -> Result<SharedEncoder> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EncoderError::Unavailable(self.reason.clone()))
    }
}

// ============================================================================
// Mock encoder
// ============================================================================

/// A table-driven encoder for tests.
///
/// Known texts map to fixed vectors; unknown texts map to the fallback
/// vector (all zeros unless set). Every call is counted so tests can assert
/// that no encoding happened.
#[derive(Debug)]
pub struct MockEncoder {
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    fail_on: Vec<String>,
    calls: AtomicUsize,
    log: Mutex<Vec<Vec<String>>>,
}

impl MockEncoder {
    /// Create a mock producing vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            table: HashMap::new(),
            fallback: vec![0.0; dimension],
            fail_on: Vec::new(),
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Map a text to a vector.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.table.insert(text.into(), vector);
        self
    }

    /// Vector returned for texts not in the table.
    pub fn with_fallback(mut self, vector: Vec<f32>) -> Self {
        self.fallback = vector;
        self
    }

    /// Fail any batch that contains this text.
    pub fn failing_on(mut self, text: impl Into<String>) -> Self {
        self.fail_on.push(text.into());
        self
    }

    /// Wrap in an `Arc`.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of `encode_batch` calls made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every batch that was encoded, in call order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(texts.to_vec());

        if let Some(bad) = texts.iter().find(|t| self.fail_on.contains(t)) {
            return Err(EncoderError::Failed(format!("mock refused to encode '{}'", bad)));
        }

        Ok(texts
            .iter()
            .map(|t| self.table.get(t).unwrap_or(&self.fallback).clone())
            .collect())
    }
}
