//! Mapping of search errors onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use quaero_index::SearchError;

/// Error type for HTTP handlers.
#[derive(Debug)]
pub struct ApiError(SearchError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SearchError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            SearchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            SearchError::BuildInProgress => StatusCode::CONFLICT,
            SearchError::EncoderUnavailable(_)
            | SearchError::CollectionLoad { .. }
            | SearchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn inner(&self) -> &SearchError {
        &self.0
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "Request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let body = serde_json::json!({
            "type": "error",
            "error": {
                "type": self.0.kind(),
                "message": message
            }
        });

        (status, Json(body)).into_response()
    }
}
