//! In-memory storage for embedded collections.
//!
//! Each collection is stored behind an `Arc`, so a `put` swaps a complete,
//! already-validated collection in one write and readers holding the old
//! `Arc` are never affected.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use crate::collection::{Collection, CollectionSummary};

/// Error type for collection store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Collection not found: {0}")]
    NotFound(String),
    #[error("Collection '{name}' has {records} records but {embeddings} embeddings")]
    LengthMismatch {
        name: String,
        records: usize,
        embeddings: usize,
    },
    #[error("Collection '{name}' mixes vector dimensions: expected {expected}, got {actual}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("Store lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Named collections with their embeddings.
///
/// Iteration order is by collection name.
#[derive(Debug, Default)]
pub struct CollectionStore {
    collections: RwLock<BTreeMap<String, Arc<Collection>>>,
}

impl CollectionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a collection, replacing any existing collection of the same
    /// name in full.
    pub fn put(&self, collection: Collection) -> Result<()> {
        let collection = Arc::new(collection);
        let mut collections = self
            .collections
            .write()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire write lock: {}", e)))?;
        collections.insert(collection.name().to_string(), collection);
        Ok(())
    }

    /// Build and register a collection from its parts.
    ///
    /// Nothing is stored unless the parts are aligned.
    pub fn put_parts(
        &self,
        name: &str,
        records: Vec<crate::collection::Record>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()> {
        self.put(Collection::new(name, records, embeddings)?)
    }

    /// Get a collection by name.
    pub fn get(&self, name: &str) -> Result<Arc<Collection>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire read lock: {}", e)))?;
        collections
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// Names of all registered collections.
    pub fn names(&self) -> Result<BTreeSet<String>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire read lock: {}", e)))?;
        Ok(collections.keys().cloned().collect())
    }

    /// All registered collections, keyed by name.
    pub fn all(&self) -> Result<BTreeMap<String, Arc<Collection>>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire read lock: {}", e)))?;
        Ok(collections.clone())
    }

    /// Name and record count of every collection.
    pub fn summaries(&self) -> Result<Vec<CollectionSummary>> {
        Ok(self.all()?.values().map(|c| c.summary()).collect())
    }

    /// Number of registered collections.
    ///
    /// A poisoned lock is logged and counts as empty.
    pub fn len(&self) -> usize {
        match self.collections.read() {
            Ok(collections) => collections.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Store lock poisoned, reporting no collections");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
