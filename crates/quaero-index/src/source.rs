//! Raw collection sources.
//!
//! A source enumerates named record sets and loads them on request. The
//! index builder treats each collection independently, so a source error
//! for one collection never affects another.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::collection::Record;

/// Error type for collection sources.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse collection '{name}': {reason}")]
    Parse { name: String, reason: String },
    #[error("Unknown collection: {0}")]
    NotFound(String),
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Enumerates and loads named record sets.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Names of the available collections.
    async fn discover(&self) -> Result<Vec<String>>;

    /// Load the records of one collection, in source order.
    async fn load(&self, name: &str) -> Result<Vec<Record>>;
}

// ============================================================================
// JSON directory source
// ============================================================================

/// Every `*.json` file in a directory is a collection named after the file
/// stem. A file holds a JSON array of record objects.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl CollectionSource for JsonDirSource {
    fn describe(&self) -> String {
        format!("json:{}", self.dir.display())
    }

    async fn discover(&self) -> Result<Vec<String>> {
        let is_dir = tokio::fs::metadata(&self.dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            tracing::warn!(dir = %self.dir.display(), "Data directory not found");
            return Ok(Vec::new());
        }

        let io_err = |source| SourceError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            // follows symlinks, so a linked collection file still counts
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            names.push(stem.to_string());
        }

        names.sort();
        Ok(names)
    }

    async fn load(&self, name: &str) -> Result<Vec<Record>> {
        let path = self.path_for(name);
        let content = tokio::fs::read_to_string(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(name.to_string())
            } else {
                SourceError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        serde_json::from_str(&content).map_err(|e| SourceError::Parse {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

// ============================================================================
// In-memory source
// ============================================================================

/// Fixed collections held in memory, with optional injected failures.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    collections: BTreeMap<String, Vec<Record>>,
    broken: BTreeMap<String, String>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection.
    pub fn with_collection(mut self, name: impl Into<String>, records: Vec<Record>) -> Self {
        self.collections.insert(name.into(), records);
        self
    }

    /// Add a collection that is discovered but fails to load.
    pub fn with_broken_collection(
        mut self,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.broken.insert(name.into(), reason.into());
        self
    }
}

#[async_trait]
impl CollectionSource for InMemorySource {
    fn describe(&self) -> String {
        format!(
            "memory:{} collections",
            self.collections.len() + self.broken.len()
        )
    }

    async fn discover(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .keys()
            .chain(self.broken.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn load(&self, name: &str) -> Result<Vec<Record>> {
        if let Some(reason) = self.broken.get(name) {
            return Err(SourceError::Unavailable(reason.clone()));
        }
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_json_dir_discovers_sorted_json_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("torts.json"), "[]").unwrap();
        fs::write(dir.path().join("contracts.json"), "[]").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("nested.json")).unwrap();

        let source = JsonDirSource::new(dir.path());
        let names = source.discover().await.unwrap();
        assert_eq!(names, vec!["contracts", "torts"]);
    }

    #[tokio::test]
    async fn test_json_dir_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let source = JsonDirSource::new(dir.path().join("does-not-exist"));
        assert!(source.discover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_dir_path_is_a_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("data.json");
        fs::write(&file, "[]").unwrap();

        let source = JsonDirSource::new(&file);
        assert!(source.discover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_dir_skips_hidden_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".draft.json"), "[]").unwrap();
        fs::write(dir.path().join("crpc.json"), "[]").unwrap();

        let source = JsonDirSource::new(dir.path());
        assert_eq!(source.discover().await.unwrap(), vec!["crpc"]);
    }

    #[tokio::test]
    async fn test_json_dir_loads_records() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("ipc.json"),
            r#"[
                {"question": "What is section 302?", "answer": "Punishment for murder.", "act": "IPC"},
                {"question": "Bail?"}
            ]"#,
        )
        .unwrap();

        let source = JsonDirSource::new(dir.path());
        let records = source.load("ipc").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].question, "What is section 302?");
        assert_eq!(records[0].extra["act"], "IPC");
        assert_eq!(records[1].answer, "");
    }

    #[tokio::test]
    async fn test_json_dir_parse_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();

        let source = JsonDirSource::new(dir.path());
        let err = source.load("bad").await.unwrap_err();
        assert!(matches!(err, SourceError::Parse { ref name, .. } if name == "bad"));
    }

    #[tokio::test]
    async fn test_json_dir_rejects_non_array() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("obj.json"), r#"{"question": "q"}"#).unwrap();

        let source = JsonDirSource::new(dir.path());
        assert!(matches!(
            source.load("obj").await,
            Err(SourceError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_json_dir_missing_file() {
        let dir = tempdir().unwrap();
        let source = JsonDirSource::new(dir.path());
        assert!(matches!(
            source.load("ghost").await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_source() {
        let source = InMemorySource::new()
            .with_collection("b", vec![Record::new("q", "a")])
            .with_broken_collection("a", "disk on fire");

        assert_eq!(source.discover().await.unwrap(), vec!["a", "b"]);
        assert_eq!(source.load("b").await.unwrap().len(), 1);
        assert!(matches!(
            source.load("a").await,
            Err(SourceError::Unavailable(_))
        ));
    }
}
