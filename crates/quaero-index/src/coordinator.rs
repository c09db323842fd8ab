//! Query entry point.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collection::Collection;
use crate::error::{Result, SearchError};
use crate::index::SearchIndex;
use crate::ranker::{ExactRanker, SimilarityRanker};
use crate::store::StoreError;

/// Which collections a query runs against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    All,
    Collection(String),
}

impl Target {
    pub const ALL: &'static str = "all";

    /// `"all"` selects every collection, anything else names one.
    pub fn parse(value: &str) -> Self {
        if value == Self::ALL {
            Target::All
        } else {
            Target::Collection(value.to_string())
        }
    }
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Target::parse(value)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::All => f.write_str(Self::ALL),
            Target::Collection(name) => f.write_str(name),
        }
    }
}

/// One ranked record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub question: String,
    pub answer: String,
    pub score: f32,
    /// Name of the collection the record came from.
    pub dataset: String,
    /// Pass-through fields of the source record.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Runs searches against the published index snapshot.
pub struct QueryCoordinator {
    index: Arc<SearchIndex>,
    ranker: Arc<dyn SimilarityRanker>,
}

impl QueryCoordinator {
    /// Coordinator using exact cosine ranking.
    pub fn new(index: Arc<SearchIndex>) -> Self {
        Self {
            index,
            ranker: Arc::new(ExactRanker::new()),
        }
    }

    pub fn with_ranker(mut self, ranker: Arc<dyn SimilarityRanker>) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn index(&self) -> &Arc<SearchIndex> {
        &self.index
    }

    /// Return up to `limit` records most similar to `query`, best first.
    ///
    /// Fails with [`SearchError::NotReady`] before touching the encoder if
    /// the index is not `Ready`. A target collection that does not exist
    /// yields an empty result. The query is encoded once and the same vector
    /// is ranked against every targeted collection; the per-collection lists
    /// are then re-sorted together and truncated to `limit`.
    pub async fn search(
        &self,
        query: &str,
        target: &Target,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let snapshot = self.index.snapshot()?;

        if query.trim().is_empty() {
            return Err(SearchError::InvalidRequest("query must not be empty".into()));
        }
        if limit == 0 {
            return Err(SearchError::InvalidRequest("limit must be at least 1".into()));
        }

        let collections: Vec<Arc<Collection>> = match target {
            Target::All => snapshot.store().all()?.into_values().collect(),
            Target::Collection(name) => match snapshot.store().get(name) {
                Ok(collection) => vec![collection],
                Err(StoreError::NotFound(_)) => {
                    tracing::debug!(collection = %name, "Search target not found");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e.into()),
            },
        };
        if collections.iter().all(|c| c.is_empty()) {
            return Ok(Vec::new());
        }

        let query_vector = snapshot.encoder().encode(query).await?;

        let mut results = Vec::new();
        for collection in &collections {
            for hit in self.ranker.rank(&query_vector, collection, limit)? {
                let record = collection.record(hit.index).ok_or_else(|| {
                    SearchError::Internal(format!(
                        "ranker returned position {} outside collection '{}'",
                        hit.index,
                        collection.name()
                    ))
                })?;
                results.push(SearchResult {
                    question: record.question.clone(),
                    answer: record.answer.clone(),
                    score: hit.score,
                    dataset: collection.name().to_string(),
                    metadata: record.extra.clone(),
                });
            }
        }

        // stable: equal scores keep collection-name order, then record order
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);

        tracing::debug!(
            dataset = %target,
            collections = collections.len(),
            results = results.len(),
            "Search complete"
        );
        Ok(results)
    }
}
