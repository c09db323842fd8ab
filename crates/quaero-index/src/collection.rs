//! Question/answer records and the embedded collections built from them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::StoreError;

/// A single question/answer record as loaded from a collection source.
///
/// `question` is the text used for similarity. Fields other than
/// `question` and `answer` are carried in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    /// Create a record with no extra fields.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            extra: Map::new(),
        }
    }

    /// Attach a pass-through field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A named, ordered set of records with one embedding per record.
///
/// Construction is the validation boundary: once a `Collection` exists its
/// records and embeddings are index-aligned and every vector has the same
/// dimension. Collections are immutable after construction.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    records: Vec<Record>,
    embeddings: Vec<Vec<f32>>,
    norms: Vec<f32>,
    dimension: usize,
}

impl Collection {
    /// Build a collection, checking alignment and dimensions.
    pub fn new(
        name: impl Into<String>,
        records: Vec<Record>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, StoreError> {
        let name = name.into();

        if records.len() != embeddings.len() {
            return Err(StoreError::LengthMismatch {
                name,
                records: records.len(),
                embeddings: embeddings.len(),
            });
        }

        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = embeddings.iter().find(|v| v.len() != dimension) {
            return Err(StoreError::DimensionMismatch {
                name,
                expected: dimension,
                actual: bad.len(),
            });
        }

        let norms = embeddings.iter().map(|v| l2_norm(v)).collect();

        Ok(Self {
            name,
            records,
            embeddings,
            norms,
            dimension,
        })
    }

    /// An empty collection (no records, no embeddings).
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            embeddings: Vec::new(),
            norms: Vec::new(),
            dimension: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    /// Precomputed L2 norms, aligned with `embeddings()`.
    pub fn norms(&self) -> &[f32] {
        &self.norms
    }

    /// Vector dimension, or 0 for an empty collection.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            name: self.name.clone(),
            count: self.records.len(),
        }
    }
}

/// Name and size of a registered collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    pub count: usize,
}

/// Euclidean norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
