//! Background index construction.
//!
//! The builder acquires an encoder, discovers collections, embeds each
//! collection's questions in one batch call, and publishes the result.
//! Encoder acquisition is the only fatal step; every per-collection failure
//! is logged and the collection is left out.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::collection::Collection;
use crate::encoder::{Encoder, EncoderError, EncoderProvider, check_batch};
use crate::index::{BuildTicket, SearchIndex};
use crate::source::{CollectionSource, SourceError};
use crate::store::StoreError;

/// Error type for index builds.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("An index build is already running")]
    InProgress,

    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// One collection could not be loaded or embedded.
    #[error("Collection '{name}' skipped: {reason}")]
    Collection { name: String, reason: String },

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Outcome of a completed build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub collections_indexed: usize,
    pub collections_skipped: usize,
    pub records_indexed: usize,
    pub elapsed_ms: u64,
}

/// Loads collections from a source and embeds them into a [`SearchIndex`].
pub struct IndexBuilder {
    source: Arc<dyn CollectionSource>,
    encoders: Arc<dyn EncoderProvider>,
}

impl IndexBuilder {
    pub fn new(source: Arc<dyn CollectionSource>, encoders: Arc<dyn EncoderProvider>) -> Self {
        Self { source, encoders }
    }

    /// Run a build to completion on the current task.
    pub async fn build(&self, index: &SearchIndex) -> Result<BuildStats> {
        let ticket = index.begin_build()?;
        self.run(index, ticket).await
    }

    /// Run a build on a background task.
    ///
    /// The build lock is taken before this returns, so a concurrent build is
    /// rejected with [`BuildError::InProgress`] here rather than inside the
    /// task.
    pub fn spawn(
        self: &Arc<Self>,
        index: Arc<SearchIndex>,
    ) -> Result<JoinHandle<Result<BuildStats>>> {
        let ticket = index.begin_build()?;
        let builder = Arc::clone(self);
        Ok(tokio::spawn(async move { builder.run(&index, ticket).await }))
    }

    async fn run(&self, index: &SearchIndex, ticket: BuildTicket) -> Result<BuildStats> {
        let started = Instant::now();
        tracing::info!(
            source = %self.source.describe(),
            reindex = ticket.is_reindex(),
            "Starting index build"
        );

        let encoder = match self.encoders.acquire().await {
            Ok(encoder) => encoder,
            Err(e) => {
                tracing::error!(error = %e, "Failed to acquire encoder, index build aborted");
                index.fail(ticket);
                return Err(BuildError::EncoderUnavailable(e.to_string()));
            }
        };
        tracing::info!(
            encoder = encoder.name(),
            dimension = encoder.dimension(),
            "Encoder acquired"
        );

        let names = match self.source.discover().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "Collection discovery failed, indexing nothing");
                Vec::new()
            }
        };

        let mut stats = BuildStats::default();
        for name in &names {
            let outcome = match self.index_collection(encoder.as_ref(), name).await {
                Ok(collection) => {
                    let count = collection.len();
                    ticket
                        .staging()
                        .put(collection)
                        .map(|_| count)
                        .map_err(|e| skipped(name, e))
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(count) => {
                    tracing::info!(collection = %name, records = count, "Collection indexed");
                    stats.collections_indexed += 1;
                    stats.records_indexed += count;
                }
                Err(e) => {
                    tracing::warn!(collection = %name, error = %e, "Skipping collection");
                    stats.collections_skipped += 1;
                }
            }
        }

        index.publish(ticket, encoder)?;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            collections = stats.collections_indexed,
            skipped = stats.collections_skipped,
            records = stats.records_indexed,
            elapsed_ms = stats.elapsed_ms,
            "Index build complete"
        );
        Ok(stats)
    }

    /// Load one collection and embed its questions in a single batch.
    async fn index_collection(&self, encoder: &dyn Encoder, name: &str) -> Result<Collection> {
        let records = self
            .source
            .load(name)
            .await
            .map_err(|e: SourceError| skipped(name, e))?;

        if records.is_empty() {
            return Ok(Collection::empty(name));
        }

        let texts: Vec<String> = records.iter().map(|r| r.question.clone()).collect();
        let vectors = encoder
            .encode_batch(&texts)
            .await
            .and_then(|v| check_batch(texts.len(), v))
            .map_err(|e: EncoderError| skipped(name, e))?;

        let collection =
            Collection::new(name, records, vectors).map_err(|e: StoreError| skipped(name, e))?;
        if collection.dimension() != encoder.dimension() {
            return Err(skipped(
                name,
                format!(
                    "encoder produced {}-dimensional vectors, expected {}",
                    collection.dimension(),
                    encoder.dimension()
                ),
            ));
        }
        Ok(collection)
    }
}

fn skipped(name: &str, reason: impl std::fmt::Display) -> BuildError {
    BuildError::Collection {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Record;
    use crate::encoder::{FailingEncoderProvider, MockEncoder, StaticEncoderProvider};
    use crate::readiness::Readiness;
    use crate::source::InMemorySource;

    fn qa(q: &str) -> Record {
        Record::new(q, format!("answer to {}", q))
    }

    fn builder(source: InMemorySource, encoder: Arc<MockEncoder>) -> IndexBuilder {
        IndexBuilder::new(
            Arc::new(source),
            Arc::new(StaticEncoderProvider::new(encoder)),
        )
    }

    #[tokio::test]
    async fn test_build_publishes_all_collections() {
        let encoder = MockEncoder::new(2)
            .with_vector("a1", vec![1.0, 0.0])
            .with_vector("a2", vec![0.0, 1.0])
            .with_vector("b1", vec![1.0, 1.0])
            .shared();
        let source = InMemorySource::new()
            .with_collection("alpha", vec![qa("a1"), qa("a2")])
            .with_collection("beta", vec![qa("b1")]);

        let index = SearchIndex::new();
        let stats = builder(source, encoder.clone()).build(&index).await.unwrap();

        assert_eq!(stats.collections_indexed, 2);
        assert_eq!(stats.collections_skipped, 0);
        assert_eq!(stats.records_indexed, 3);
        assert_eq!(index.readiness(), Readiness::Ready);

        let snapshot = index.snapshot().unwrap();
        let alpha = snapshot.store().get("alpha").unwrap();
        assert_eq!(alpha.embeddings(), &[vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(alpha.records()[1].question, "a2");
    }

    #[tokio::test]
    async fn test_one_batch_call_per_collection() {
        let encoder = MockEncoder::new(2).with_fallback(vec![1.0, 0.0]).shared();
        let source = InMemorySource::new()
            .with_collection("a", vec![qa("x"), qa("y"), qa("z")])
            .with_collection("b", vec![qa("w")]);

        let index = SearchIndex::new();
        builder(source, encoder.clone()).build(&index).await.unwrap();

        assert_eq!(encoder.call_count(), 2);
        assert_eq!(
            encoder.batches()[0],
            vec!["x".to_string(), "y".to_string(), "z".to_string()]
        );
    }

    #[tokio::test]
    async fn test_encoder_unavailable_fails_index() {
        let provider = Arc::new(FailingEncoderProvider::new("model missing"));
        let source = InMemorySource::new().with_collection("a", vec![qa("x")]);
        let builder = IndexBuilder::new(Arc::new(source), provider.clone());

        let index = SearchIndex::new();
        let err = builder.build(&index).await.unwrap_err();
        assert!(matches!(err, BuildError::EncoderUnavailable(_)));
        assert_eq!(index.readiness(), Readiness::Failed);
        assert_eq!(provider.attempts(), 1);
    }

    #[tokio::test]
    async fn test_per_collection_failures_are_skipped() {
        let encoder = MockEncoder::new(2)
            .with_fallback(vec![1.0, 0.0])
            .failing_on("poison")
            .shared();
        let source = InMemorySource::new()
            .with_collection("good", vec![qa("fine")])
            .with_collection("embed_fails", vec![qa("poison")])
            .with_broken_collection("load_fails", "corrupt file");

        let index = SearchIndex::new();
        let stats = builder(source, encoder).build(&index).await.unwrap();

        assert_eq!(stats.collections_indexed, 1);
        assert_eq!(stats.collections_skipped, 2);
        assert_eq!(index.readiness(), Readiness::Ready);

        let names = index.snapshot().unwrap().store().names().unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["good"]);
    }

    #[tokio::test]
    async fn test_empty_source_is_ready() {
        let encoder = MockEncoder::new(2).shared();
        let index = SearchIndex::new();
        let stats = builder(InMemorySource::new(), encoder.clone())
            .build(&index)
            .await
            .unwrap();

        assert_eq!(stats.collections_indexed, 0);
        assert_eq!(stats.records_indexed, 0);
        assert_eq!(index.readiness(), Readiness::Ready);
        assert_eq!(encoder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_collection_published_without_encoding() {
        let encoder = MockEncoder::new(2).shared();
        let source = InMemorySource::new().with_collection("empty", Vec::new());

        let index = SearchIndex::new();
        builder(source, encoder.clone()).build(&index).await.unwrap();

        let empty = index.snapshot().unwrap().store().get("empty").unwrap();
        assert!(empty.is_empty());
        assert_eq!(encoder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_skipped() {
        let encoder = MockEncoder::new(3).with_fallback(vec![1.0, 0.0]).shared();
        let source = InMemorySource::new().with_collection("a", vec![qa("x")]);

        let index = SearchIndex::new();
        let stats = builder(source, encoder).build(&index).await.unwrap();
        assert_eq!(stats.collections_skipped, 1);
        assert!(index.snapshot().unwrap().store().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_runs_in_background() {
        let encoder = MockEncoder::new(2).with_fallback(vec![0.0, 1.0]).shared();
        let source = InMemorySource::new().with_collection("a", vec![qa("x")]);
        let builder = Arc::new(builder(source, encoder));
        let index = Arc::new(SearchIndex::new());

        let handle = builder.spawn(index.clone()).unwrap();
        // the build lock is already held
        assert!(matches!(
            builder.spawn(index.clone()),
            Err(BuildError::InProgress)
        ));

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.collections_indexed, 1);
        assert_eq!(index.readiness(), Readiness::Ready);
    }
}
