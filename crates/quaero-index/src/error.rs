//! Caller-facing error taxonomy for search operations.

use crate::builder::BuildError;
use crate::encoder::EncoderError;
use crate::ranker::RankError;
use crate::readiness::Readiness;
use crate::store::StoreError;

/// Result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors surfaced to callers of the search index.
///
/// Per-collection load failures never reach a query caller: the builder logs
/// them and leaves the collection out of the index.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The index is not `Ready`; retry later.
    #[error("Service not ready (index is {0})")]
    NotReady(Readiness),

    /// No encoder could be obtained while building the index.
    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("Failed to load collection '{name}': {reason}")]
    CollectionLoad { name: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("An index build is already running")]
    BuildInProgress,

    /// Anything unexpected during encoding or scoring.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::NotReady(_) | SearchError::BuildInProgress)
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::NotReady(_) => "service_not_ready",
            SearchError::EncoderUnavailable(_) => "encoder_unavailable",
            SearchError::CollectionLoad { .. } => "collection_load_error",
            SearchError::InvalidRequest(_) => "invalid_request_error",
            SearchError::BuildInProgress => "build_in_progress",
            SearchError::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for SearchError {
    fn from(err: StoreError) -> Self {
        SearchError::Internal(err.to_string())
    }
}

impl From<RankError> for SearchError {
    fn from(err: RankError) -> Self {
        SearchError::Internal(err.to_string())
    }
}

impl From<EncoderError> for SearchError {
    fn from(err: EncoderError) -> Self {
        match err {
            EncoderError::Unavailable(msg) => SearchError::EncoderUnavailable(msg),
            other => SearchError::Internal(other.to_string()),
        }
    }
}

impl From<BuildError> for SearchError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::InProgress => SearchError::BuildInProgress,
            BuildError::EncoderUnavailable(msg) => SearchError::EncoderUnavailable(msg),
            BuildError::Collection { name, reason } => SearchError::CollectionLoad { name, reason },
            other => SearchError::Internal(other.to_string()),
        }
    }
}
