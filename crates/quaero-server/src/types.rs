//! Request and response bodies.

use serde::{Deserialize, Serialize};

use quaero_index::{CollectionSummary, Readiness, SearchResult};

/// Body of `POST /search`.
///
/// `dataset` and `limit` fall back to the server's configured defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            dataset: None,
            limit: None,
        }
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Body of a successful `POST /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: usize,
    /// Wall-clock seconds spent serving the query.
    pub time_taken: f64,
}

impl SearchResponse {
    pub fn new(results: Vec<SearchResult>, time_taken: f64) -> Self {
        Self {
            total: results.len(),
            results,
            time_taken,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"healthy"` once the index is ready, `"initializing"` otherwise.
    pub status: String,
    pub phase: Readiness,
}

impl HealthResponse {
    pub const HEALTHY: &'static str = "healthy";
    pub const INITIALIZING: &'static str = "initializing";

    pub fn from_readiness(phase: Readiness) -> Self {
        let status = if phase.is_ready() {
            Self::HEALTHY
        } else {
            Self::INITIALIZING
        };
        Self {
            status: status.to_string(),
            phase,
        }
    }
}

/// Body of `GET /datasets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetsResponse {
    pub datasets: Vec<CollectionSummary>,
}

/// Body of `POST /reindex`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexResponse {
    pub status: String,
}

impl ReindexResponse {
    pub fn accepted() -> Self {
        Self {
            status: "accepted".to_string(),
        }
    }
}
