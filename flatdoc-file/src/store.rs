//! File-backed snapshot storage.
//!
//! The whole snapshot lives in one JSON file shaped
//! `{ "<collection>": { "<identity>": { ...fields } } }`. Reads are served from a cache;
//! every save rewrites the complete file and refreshes the cache only once the write
//! succeeded.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use std::{
    fs::{self, OpenOptions},
    io::Read,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, info, warn};

use flatdoc_core::{
    backend::{CollectionMap, Snapshot, StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Extension the data file must carry.
pub const DATA_FILE_EXTENSION: &str = "json";

/// Snapshot backend persisting to a single JSON file.
///
/// `FileStore` is cloneable and uses an `Arc`-wrapped internal state; clones share the
/// cache and the file, so a save through one clone is visible to every other clone's
/// next load.
///
/// Writes are not crash-safe: the file is truncated and rewritten in place, so a crash
/// mid-write can leave it corrupt.
///
/// # Example
///
/// ```ignore
/// use flatdoc_file::FileStore;
/// use flatdoc::backend::StoreBackendBuilder;
///
/// let backend = FileStore::builder()
///     .path("data/db.json")
///     .build()
///     .await?;
/// ```
#[derive(Clone, Debug)]
pub struct FileStore {
    inner: Arc<FileStoreInner>,
}

#[derive(Debug)]
struct FileStoreInner {
    path: PathBuf,
    pretty: bool,
    connected: AtomicBool,
    /// `None` until the file has been read once.
    cache: RwLock<Option<Snapshot>>,
}

impl FileStore {
    /// Creates a builder for constructing a `FileStore`.
    pub fn builder() -> FileStoreBuilder {
        FileStoreBuilder::default()
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn ensure_connected(&self) -> DocumentStoreResult<()> {
        if !self.is_connected() {
            return Err(DocumentStoreError::ConnectionNotEstablished);
        }
        Ok(())
    }

    /// Reads the file, creating it if missing. Blank content is an empty snapshot.
    fn read_file(&self) -> DocumentStoreResult<Snapshot> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.inner.path)?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;

        if content.trim().is_empty() {
            return Ok(Snapshot::new());
        }

        serde_json::from_str(&content).map_err(|err| {
            DocumentStoreError::Serialization(format!(
                "{} is not a valid snapshot: {err}",
                self.inner.path.display(),
            ))
        })
    }

    fn write_file(&self, snapshot: &Snapshot) -> DocumentStoreResult<()> {
        let content = if self.inner.pretty {
            serde_json::to_string_pretty(snapshot)?
        } else {
            serde_json::to_string(snapshot)?
        };

        fs::write(&self.inner.path, content)?;

        debug!(
            target: "flatdoc::file",
            path = %self.inner.path.display(),
            collections = snapshot.len(),
            "wrote snapshot"
        );
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for FileStore {
    async fn load(&self, force: bool) -> DocumentStoreResult<Snapshot> {
        self.ensure_connected()?;

        if !force {
            if let Some(snapshot) = self.inner.cache.read().await.as_ref() {
                return Ok(snapshot.clone());
            }
        }

        let mut cache = self.inner.cache.write().await;
        let snapshot = self.read_file()?;
        *cache = Some(snapshot.clone());

        debug!(
            target: "flatdoc::file",
            path = %self.inner.path.display(),
            collections = snapshot.len(),
            "read snapshot"
        );
        Ok(snapshot)
    }

    async fn load_collection(
        &self,
        collection: &str,
        force: bool,
    ) -> DocumentStoreResult<Option<CollectionMap>> {
        self.ensure_connected()?;

        if !force {
            if let Some(snapshot) = self.inner.cache.read().await.as_ref() {
                return Ok(snapshot.get(collection).cloned());
            }
        }

        let mut cache = self.inner.cache.write().await;
        let snapshot = self.read_file()?;
        let documents = snapshot.get(collection).cloned();
        *cache = Some(snapshot);

        Ok(documents)
    }

    async fn save(&self, collection: &str, documents: &CollectionMap) -> DocumentStoreResult<()> {
        self.ensure_connected()?;
        let mut cache = self.inner.cache.write().await;

        let mut snapshot = match cache.as_ref() {
            Some(snapshot) => snapshot.clone(),
            None => self.read_file()?,
        };
        snapshot.insert(collection.to_string(), documents.clone());

        // The cache only ever holds what the file holds.
        self.write_file(&snapshot)?;
        *cache = Some(snapshot);
        Ok(())
    }

    async fn drop_database(&self) -> DocumentStoreResult<()> {
        self.ensure_connected()?;
        let mut cache = self.inner.cache.write().await;

        let mut snapshot = match cache.as_ref() {
            Some(snapshot) => snapshot.clone(),
            None => self.read_file()?,
        };
        for documents in snapshot.values_mut() {
            documents.clear();
        }

        self.write_file(&snapshot)?;
        *cache = Some(snapshot);

        info!(target: "flatdoc::file", path = %self.inner.path.display(), "dropped every collection's documents");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    async fn disconnect(&self) -> DocumentStoreResult<()> {
        if self.inner.connected.swap(false, Ordering::AcqRel) {
            *self.inner.cache.write().await = None;
            info!(target: "flatdoc::file", path = %self.inner.path.display(), "disconnected");
        } else {
            warn!(target: "flatdoc::file", "disconnect called on a disconnected store");
        }

        Ok(())
    }
}

/// Builder for constructing [`FileStore`] instances.
///
/// Building checks the path and reads the file once, so a malformed snapshot is reported
/// at connect time rather than on first use.
///
/// # Example
///
/// ```ignore
/// use flatdoc_file::FileStore;
/// use flatdoc::backend::StoreBackendBuilder;
///
/// let store = FileStore::builder()
///     .path("db.json")
///     .pretty(true)
///     .build()
///     .await?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct FileStoreBuilder {
    path: Option<PathBuf>,
    pretty: bool,
}

impl FileStoreBuilder {
    /// Sets the data file. It must end in `.json`; it is created on first read if missing.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Pretty-prints the snapshot when writing it.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for FileStoreBuilder {
    type Backend = FileStore;

    /// Builds a connected [`FileStore`].
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::ConnectionNotEstablished`] when no path was configured
    /// - [`DocumentStoreError::InvalidPath`] when the path does not end in `.json`
    /// - I/O or serialization errors when the existing file cannot be read
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let path = self
            .path
            .ok_or(DocumentStoreError::ConnectionNotEstablished)?;

        if path.extension().and_then(|ext| ext.to_str()) != Some(DATA_FILE_EXTENSION) {
            return Err(DocumentStoreError::InvalidPath(format!(
                "{} must end with .{DATA_FILE_EXTENSION}",
                path.display(),
            )));
        }

        let store = FileStore {
            inner: Arc::new(FileStoreInner {
                path,
                pretty: self.pretty,
                connected: AtomicBool::new(true),
                cache: RwLock::new(None),
            }),
        };

        let snapshot = store.load(true).await?;
        info!(
            target: "flatdoc::file",
            path = %store.path().display(),
            collections = snapshot.len(),
            "connected"
        );

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn documents(entries: &[(&str, Value)]) -> CollectionMap {
        entries
            .iter()
            .map(|(id, fields)| (id.to_string(), fields.as_object().cloned().unwrap()))
            .collect()
    }

    async fn open(dir: &TempDir) -> FileStore {
        FileStore::builder()
            .path(dir.path().join("db.json"))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn missing_file_is_created_empty() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        assert!(store.load(false).await.unwrap().is_empty());
        assert!(dir.path().join("db.json").exists());
    }

    #[tokio::test]
    async fn save_rewrites_full_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        store
            .save("User", &documents(&[("1", json!({ "_id": "1", "name": "A" }))]))
            .await
            .unwrap();
        store
            .save("Post", &documents(&[("2", json!({ "_id": "2" }))]))
            .await
            .unwrap();

        let written: Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(
            written,
            json!({
                "User": { "1": { "_id": "1", "name": "A" } },
                "Post": { "2": { "_id": "2" } },
            })
        );
    }

    #[tokio::test]
    async fn reload_preserves_key_order() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        store
            .save(
                "User",
                &documents(&[
                    ("z", json!({ "_id": "z" })),
                    ("a", json!({ "_id": "a" })),
                    ("m", json!({ "_id": "m" })),
                ]),
            )
            .await
            .unwrap();

        let reopened = open(&dir).await;
        let users = reopened.load_collection("User", false).await.unwrap().unwrap();

        assert_eq!(users.keys().collect::<Vec<_>>(), ["z", "a", "m"]);
    }

    #[tokio::test]
    async fn cache_is_served_until_forced() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        fs::write(store.path(), r#"{ "User": { "1": { "_id": "1" } } }"#).unwrap();

        assert!(store.load(false).await.unwrap().is_empty());
        assert_eq!(store.load(true).await.unwrap()["User"].len(), 1);
    }

    #[tokio::test]
    async fn drop_database_keeps_collections() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        store
            .save("User", &documents(&[("1", json!({ "_id": "1" }))]))
            .await
            .unwrap();

        store.drop_database().await.unwrap();

        let reopened = open(&dir).await;
        let snapshot = reopened.load(false).await.unwrap();
        assert!(snapshot["User"].is_empty());
    }

    #[tokio::test]
    async fn failed_write_does_not_leak_into_later_saves() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        let store = FileStore::builder()
            .path(data.join("db.json"))
            .build()
            .await
            .unwrap();
        store
            .save("User", &documents(&[("1", json!({ "_id": "1" }))]))
            .await
            .unwrap();

        fs::remove_dir_all(&data).unwrap();
        let ghost = documents(&[("1", json!({ "_id": "1" })), ("ghost", json!({ "_id": "ghost" }))]);
        assert!(store.save("User", &ghost).await.is_err());
        assert!(store.drop_database().await.is_err());

        fs::create_dir(&data).unwrap();
        store
            .save("Post", &documents(&[("2", json!({ "_id": "2" }))]))
            .await
            .unwrap();

        let written: Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(
            written,
            json!({
                "User": { "1": { "_id": "1" } },
                "Post": { "2": { "_id": "2" } },
            })
        );
        assert!(!store.load(false).await.unwrap()["User"].contains_key("ghost"));
    }

    #[tokio::test]
    async fn pretty_output_is_indented() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::builder()
            .path(dir.path().join("db.json"))
            .pretty(true)
            .build()
            .await
            .unwrap();

        store.save("User", &CollectionMap::new()).await.unwrap();

        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{\n  \"User\": {}\n}");
    }

    #[tokio::test]
    async fn path_is_required() {
        assert!(matches!(
            FileStore::builder().build().await,
            Err(DocumentStoreError::ConnectionNotEstablished)
        ));
    }

    #[tokio::test]
    async fn path_must_be_json() {
        let dir = TempDir::new().unwrap();

        assert!(matches!(
            FileStore::builder().path(dir.path().join("db.txt")).build().await,
            Err(DocumentStoreError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            FileStore::builder().path(path).build().await,
            Err(DocumentStoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn disconnected_store_refuses_operations() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        let clone = store.clone();

        store.disconnect().await.unwrap();

        assert!(!clone.is_connected());
        assert!(matches!(
            clone.load(false).await,
            Err(DocumentStoreError::ConnectionNotEstablished)
        ));
        assert!(matches!(
            clone.save("User", &CollectionMap::new()).await,
            Err(DocumentStoreError::ConnectionNotEstablished)
        ));
    }
}
