//! The search index: single owner of readiness and the published snapshot.
//!
//! A build fills a fresh staging [`CollectionStore`]. When it finishes the
//! store and the encoder that produced its vectors are frozen into an
//! [`IndexSnapshot`], the snapshot is written, and only then is readiness
//! flipped to `Ready`. Readers check readiness first and then take the
//! snapshot, so a reader that sees `Ready` always sees a complete store.
//! Re-indexing swaps the snapshot pointer and never mutates a published
//! store.

use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, OwnedMutexGuard, watch};

use crate::builder::BuildError;
use crate::collection::CollectionSummary;
use crate::encoder::SharedEncoder;
use crate::error::{Result, SearchError};
use crate::readiness::Readiness;
use crate::store::CollectionStore;

/// An immutable, queryable view: a complete store plus its encoder.
#[derive(Clone)]
pub struct IndexSnapshot {
    encoder: SharedEncoder,
    store: Arc<CollectionStore>,
}

impl IndexSnapshot {
    pub fn new(encoder: SharedEncoder, store: Arc<CollectionStore>) -> Self {
        Self { encoder, store }
    }

    /// The encoder that produced every vector in the store.
    pub fn encoder(&self) -> &SharedEncoder {
        &self.encoder
    }

    pub fn store(&self) -> &Arc<CollectionStore> {
        &self.store
    }
}

impl std::fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("encoder", &self.encoder.name())
            .field("collections", &self.store.len())
            .finish()
    }
}

/// Exclusive right to run one build, plus the store it fills.
///
/// Holding the ticket holds the build lock; it is released when the ticket
/// is consumed by [`SearchIndex::publish`] or [`SearchIndex::fail`].
pub struct BuildTicket {
    staging: Arc<CollectionStore>,
    reindex: bool,
    _guard: OwnedMutexGuard<()>,
}

impl BuildTicket {
    /// The store this build writes into.
    pub fn staging(&self) -> &Arc<CollectionStore> {
        &self.staging
    }

    /// Whether a previous snapshot was already published when the build began.
    pub fn is_reindex(&self) -> bool {
        self.reindex
    }
}

/// Process-wide search index state.
pub struct SearchIndex {
    readiness: watch::Sender<Readiness>,
    published: RwLock<Option<Arc<IndexSnapshot>>>,
    staging: RwLock<Option<Arc<CollectionStore>>>,
    build_lock: Arc<Mutex<()>>,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchIndex {
    /// Create an index in the `Uninitialized` state.
    pub fn new() -> Self {
        let (readiness, _) = watch::channel(Readiness::Uninitialized);
        Self {
            readiness,
            published: RwLock::new(None),
            staging: RwLock::new(None),
            build_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Current readiness.
    pub fn readiness(&self) -> Readiness {
        *self.readiness.borrow()
    }

    /// Receive every readiness change.
    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.readiness.subscribe()
    }

    /// Wait until the index is `Ready` or `Failed`.
    pub async fn wait_until_settled(&self) -> Readiness {
        let mut rx = self.readiness.subscribe();
        match rx.wait_for(|r| r.is_settled()).await {
            Ok(state) => *state,
            Err(_) => self.readiness(),
        }
    }

    /// Whether a build currently holds the build lock.
    pub fn is_building(&self) -> bool {
        self.build_lock.try_lock().is_err()
    }

    /// The published snapshot, or `NotReady` if the index is not `Ready`.
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        let state = self.readiness();
        if !state.is_ready() {
            return Err(SearchError::NotReady(state));
        }
        let published = self
            .published
            .read()
            .map_err(|e| SearchError::Internal(format!("Failed to acquire read lock: {}", e)))?;
        published.clone().ok_or(SearchError::NotReady(state))
    }

    /// Name and record count of each collection.
    ///
    /// Once `Ready` this reads the published snapshot. Before that it reads
    /// the store being built, so collections appear as they finish.
    pub fn collections(&self) -> Result<Vec<CollectionSummary>> {
        if let Ok(snapshot) = self.snapshot() {
            return Ok(snapshot.store().summaries()?);
        }
        let staging = self
            .staging
            .read()
            .map_err(|e| SearchError::Internal(format!("Failed to acquire read lock: {}", e)))?;
        match staging.as_ref() {
            Some(store) => Ok(store.summaries()?),
            None => Ok(Vec::new()),
        }
    }

    // ========================================================================
    // Build lifecycle (driven by the IndexBuilder)
    // ========================================================================

    /// Start a build.
    ///
    /// An initial build (or a re-init after `Failed`) moves readiness to
    /// `Loading`. A re-index of a `Ready` index leaves readiness alone and
    /// keeps serving the old snapshot.
    pub fn begin_build(&self) -> std::result::Result<BuildTicket, BuildError> {
        let guard = self
            .build_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| BuildError::InProgress)?;

        let staging = Arc::new(CollectionStore::new());
        {
            let mut slot = self
                .staging
                .write()
                .map_err(|e| BuildError::Lock(format!("Failed to acquire write lock: {}", e)))?;
            *slot = Some(staging.clone());
        }

        let reindex = self.readiness().is_ready();
        if !reindex {
            self.transition(Readiness::Loading);
        }
        tracing::debug!(reindex, "Index build started");

        Ok(BuildTicket {
            staging,
            reindex,
            _guard: guard,
        })
    }

    /// Publish the ticket's store as the new snapshot, then mark `Ready`.
    pub fn publish(
        &self,
        ticket: BuildTicket,
        encoder: SharedEncoder,
    ) -> std::result::Result<(), BuildError> {
        let snapshot = Arc::new(IndexSnapshot::new(encoder, ticket.staging.clone()));
        let written = self
            .published
            .write()
            .map(|mut published| *published = Some(snapshot))
            .map_err(|e| BuildError::Lock(format!("Failed to acquire write lock: {}", e)));

        if let Err(e) = written {
            self.fail(ticket);
            return Err(e);
        }

        // the snapshot write above happens-before this send
        self.transition(Readiness::Ready);
        // cleared only once readers can see the snapshot
        self.clear_staging();
        Ok(())
    }

    /// Abandon the build.
    ///
    /// An initial build moves to `Failed`. A failed re-index keeps the
    /// previous snapshot published and the index `Ready`.
    pub fn fail(&self, ticket: BuildTicket) {
        self.clear_staging();
        if ticket.reindex {
            tracing::warn!("Re-index abandoned, previous snapshot stays published");
        } else {
            self.transition(Readiness::Failed);
        }
    }

    fn clear_staging(&self) {
        match self.staging.write() {
            Ok(mut slot) => *slot = None,
            Err(e) => tracing::warn!(error = %e, "Failed to clear staging store"),
        }
    }

    fn transition(&self, next: Readiness) {
        let changed = self.readiness.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!(readiness = %next, "Index readiness changed");
        }
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("readiness", &self.readiness())
            .finish()
    }
}
