//! quaero-server: HTTP surface for the quaero search index
//!
//! - `GET /health` reports readiness without ever blocking on the index
//! - `GET /datasets` lists collections and record counts
//! - `POST /search` runs a query against one or all collections
//! - `POST /reindex` rebuilds the index in the background

pub mod error;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use server::{DEFAULT_LIMIT, SearchServer, ServerConfig};
pub use types::{
    DatasetsResponse, HealthResponse, ReindexResponse, SearchRequest, SearchResponse,
};
