//! HTTP server.
//!
//! Routes:
//! - `GET /health`: readiness summary, always 200
//! - `GET /datasets`: collections and record counts
//! - `POST /search`: ranked results
//! - `POST /reindex`: rebuild the index in the background

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use quaero_index::{IndexBuilder, QueryCoordinator, SearchError, SearchIndex, Target};

use crate::error::ApiError;
use crate::types::{DatasetsResponse, HealthResponse, ReindexResponse, SearchRequest, SearchResponse};

/// Default number of results per query.
pub const DEFAULT_LIMIT: usize = 5;

/// Configuration for the search server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
    /// Whether to enable CORS.
    pub enable_cors: bool,
    /// Whether to enable request tracing (HTTP layer).
    pub enable_tracing: bool,
    /// Dataset searched when a request names none.
    pub default_dataset: String,
    /// Result count when a request gives no limit.
    pub default_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            enable_cors: true,
            enable_tracing: true,
            default_dataset: Target::ALL.to_string(),
            default_limit: DEFAULT_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Create a config with the given bind address.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    pub fn with_tracing(mut self, enable: bool) -> Self {
        self.enable_tracing = enable;
        self
    }

    pub fn with_default_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.default_dataset = dataset.into();
        self
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }
}

struct AppState {
    coordinator: QueryCoordinator,
    builder: Arc<IndexBuilder>,
    default_dataset: String,
    default_limit: usize,
}

impl AppState {
    fn index(&self) -> &Arc<SearchIndex> {
        self.coordinator.index()
    }
}

/// HTTP front end over a [`SearchIndex`].
pub struct SearchServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl SearchServer {
    /// Create a server; `builder` is used for `POST /reindex`.
    pub fn new(config: ServerConfig, index: Arc<SearchIndex>, builder: Arc<IndexBuilder>) -> Self {
        Self::with_coordinator(config, QueryCoordinator::new(index), builder)
    }

    /// Create a server around an existing coordinator.
    pub fn with_coordinator(
        config: ServerConfig,
        coordinator: QueryCoordinator,
        builder: Arc<IndexBuilder>,
    ) -> Self {
        let state = Arc::new(AppState {
            coordinator,
            builder,
            default_dataset: config.default_dataset.clone(),
            default_limit: config.default_limit,
        });
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(handle_health))
            .route("/datasets", get(handle_datasets))
            .route("/search", post(handle_search))
            .route("/reindex", post(handle_reindex))
            .with_state(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Run the server.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Starting search server");
        axum::serve(listener, self.router()).await
    }

    /// Run the server with graceful shutdown.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Starting search server");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

/// Handle GET /health
async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse::from_readiness(state.index().readiness()))
}

/// Handle GET /datasets
///
/// Served in every phase; while loading it lists what has been indexed so far.
async fn handle_datasets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DatasetsResponse>, ApiError> {
    let datasets = state.index().collections()?;
    Ok(Json(DatasetsResponse { datasets }))
}

/// Handle POST /search
async fn handle_search(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<SearchResponse>, ApiError> {
    let started = Instant::now();

    // not-ready wins over a malformed body
    let readiness = state.index().readiness();
    if !readiness.is_ready() {
        return Err(SearchError::NotReady(readiness).into());
    }

    let request: SearchRequest = serde_json::from_str(&body)
        .map_err(|e| SearchError::InvalidRequest(format!("Invalid JSON: {}", e)))?;
    let dataset = request
        .dataset
        .unwrap_or_else(|| state.default_dataset.clone());
    let limit = request.limit.unwrap_or(state.default_limit);

    let results = state
        .coordinator
        .search(&request.query, &Target::parse(&dataset), limit)
        .await?;

    let response = SearchResponse::new(results, started.elapsed().as_secs_f64());
    tracing::info!(
        dataset = %dataset,
        limit,
        total = response.total,
        time_taken = response.time_taken,
        "Search served"
    );
    Ok(Json(response))
}

/// Handle POST /reindex
async fn handle_reindex(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state
        .builder
        .spawn(state.index().clone())
        .map_err(SearchError::from)?;
    // the builder logs its own outcome
    drop(handle);

    tracing::info!("Re-index accepted");
    Ok((StatusCode::ACCEPTED, Json(ReindexResponse::accepted())))
}
