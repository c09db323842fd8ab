//! quaero-index: semantic search over question/answer collections
//!
//! This crate provides the search engine behind quaero:
//! - Typed records and index-aligned collections of embedding vectors
//! - A collection store with whole-entry, all-or-nothing publication
//! - A readiness state machine that gates queries until an index exists
//! - Background index construction from pluggable collection sources
//! - Exact cosine top-k ranking and cross-collection query coordination

pub mod builder;
pub mod collection;
pub mod coordinator;
pub mod encoder;
pub mod error;
pub mod hashing;
pub mod index;
pub mod ollama;
pub mod ranker;
pub mod readiness;
pub mod source;
pub mod store;

pub use builder::{BuildError, BuildStats, IndexBuilder};
pub use collection::{Collection, CollectionSummary, Record};
pub use coordinator::{QueryCoordinator, SearchResult, Target};
pub use encoder::{
    Encoder, EncoderError, EncoderProvider, FailingEncoderProvider, MockEncoder, SharedEncoder,
    StaticEncoderProvider,
};
pub use error::{Result, SearchError};
pub use hashing::{HashingEncoder, HashingEncoderProvider};
pub use index::{BuildTicket, IndexSnapshot, SearchIndex};
pub use ollama::{OllamaEncoder, OllamaEncoderConfig, OllamaEncoderProvider};
pub use ranker::{ExactRanker, RankError, RankedHit, SimilarityRanker, cosine_similarity};
pub use readiness::Readiness;
pub use source::{CollectionSource, InMemorySource, JsonDirSource, SourceError};
pub use store::{CollectionStore, StoreError};
