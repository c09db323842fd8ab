//! Similarity ranking over one collection.
//!
//! The [`SimilarityRanker`] trait is the seam where an approximate
//! nearest-neighbour index could replace the exact scan: query vector in,
//! ranked record positions out.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::collection::{Collection, l2_norm};

/// Error type for ranking.
#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error("Query has dimension {actual} but collection '{collection}' has {expected}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, RankError>;

/// A record position within a collection and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedHit {
    pub index: usize,
    pub score: f32,
}

/// Selects the highest-scoring records of a collection for a query vector.
pub trait SimilarityRanker: Send + Sync {
    /// Return the top `k` hits, best first, length `min(k, collection.len())`.
    ///
    /// Equal scores keep collection order.
    fn rank(&self, query: &[f32], collection: &Collection, k: usize) -> Result<Vec<RankedHit>>;
}

/// Cosine similarity of two vectors; 0.0 if either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}

/// Cosine similarity with precomputed norms.
///
/// Zero is always `+0.0`, so orthogonal vectors tie with zero-norm ones
/// under `total_cmp`.
pub fn cosine_with_norms(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let score = dot / (a_norm * b_norm);
    // NaN, and -0.0 from sums of negative zero products
    if score.is_nan() || score == 0.0 {
        0.0
    } else {
        score.clamp(-1.0, 1.0)
    }
}

/// Exhaustive cosine scan with a bounded heap.
///
/// O(n·d) scoring plus O(n log k) selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactRanker;

impl ExactRanker {
    pub fn new() -> Self {
        Self
    }
}

/// Heap entry ordered so that "greater" means "better": higher score, then
/// earlier position.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl SimilarityRanker for ExactRanker {
    fn rank(&self, query: &[f32], collection: &Collection, k: usize) -> Result<Vec<RankedHit>> {
        let k = k.min(collection.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        if collection.dimension() != query.len() {
            return Err(RankError::DimensionMismatch {
                collection: collection.name().to_string(),
                expected: collection.dimension(),
                actual: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        // min-heap of the best k seen so far; the worst kept candidate is on top
        let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);

        let scored = collection
            .embeddings()
            .iter()
            .zip(collection.norms())
            .enumerate();
        for (index, (vector, norm)) in scored {
            let candidate = Candidate {
                score: cosine_with_norms(query, query_norm, vector, *norm),
                index,
            };
            if heap.len() < k {
                heap.push(Reverse(candidate));
            } else if let Some(Reverse(worst)) = heap.peek() {
                if candidate > *worst {
                    heap.pop();
                    heap.push(Reverse(candidate));
                }
            }
        }

        // ascending order of Reverse<_> is best-first
        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(c)| RankedHit {
                index: c.index,
                score: c.score,
            })
            .collect())
    }
}
