//! Main document store interface.
//!
//! A [`DocumentStore`] owns one persistence backend and a registry of collection
//! engines, one per collection name. Every handle returned for a name shares that
//! name's engine, so all handles observe the same documents.
//!
//! # Example
//!
//! ```ignore
//! use flatdoc::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! let users = store.typed_collection::<User>().await?;
//! let logs = store.collection("logs").await?;
//! ```

use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

use crate::{
    backend::StoreBackend,
    collection::{Collection, CollectionEngine, CollectionOptions, TypedCollection},
    document::{DocumentFactory, Model, ModelFactory, RawFactory},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// A document store bound to a persistence backend.
///
/// Cloning is cheap and yields a handle to the same store.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    backend: Arc<dyn StoreBackend>,
    options: CollectionOptions,
    engines: RwLock<HashMap<String, Arc<CollectionEngine>>>,
}

impl DocumentStore {
    /// Creates a new document store with the given backend and default collection options.
    pub fn new(backend: impl StoreBackend + 'static) -> Self {
        Self::with_options(backend, CollectionOptions::default())
    }

    /// Creates a new document store whose collections use `options`.
    pub fn with_options(backend: impl StoreBackend + 'static, options: CollectionOptions) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend: Arc::new(backend),
                options,
                engines: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.inner.backend
    }

    /// Gets an untyped handle to the collection `name`, initializing it on first use.
    ///
    /// # Errors
    ///
    /// Fails if the backend is disconnected or the collection cannot be loaded.
    pub async fn collection(&self, name: &str) -> DocumentStoreResult<Collection> {
        self.collection_with(name, RawFactory).await
    }

    /// Gets a typed collection for the model `M`, named by `M::collection_name()`.
    ///
    /// # Errors
    ///
    /// See [`collection`](Self::collection).
    pub async fn typed_collection<M: Model>(&self) -> DocumentStoreResult<TypedCollection<M>> {
        self.collection_with(M::collection_name(), ModelFactory::new())
            .await
    }

    /// Gets a handle to the collection `name` that builds documents with `factory`.
    ///
    /// # Errors
    ///
    /// See [`collection`](Self::collection).
    pub async fn collection_with<F: DocumentFactory>(
        &self,
        name: &str,
        factory: F,
    ) -> DocumentStoreResult<Collection<F>> {
        Ok(Collection::new(self.engine(name).await?, factory))
    }

    async fn engine(&self, name: &str) -> DocumentStoreResult<Arc<CollectionEngine>> {
        if name.is_empty() {
            return Err(DocumentStoreError::InvalidCollectionName(name.to_string()));
        }

        if let Some(engine) = self.inner.engines.read().await.get(name) {
            return Ok(engine.clone());
        }

        let mut engines = self.inner.engines.write().await;
        if let Some(engine) = engines.get(name) {
            return Ok(engine.clone());
        }

        let engine = Arc::new(
            CollectionEngine::initialize(
                name,
                self.inner.backend.clone(),
                self.inner.options.clone(),
            )
            .await?,
        );
        engines.insert(name.to_string(), engine.clone());

        debug!(target: "flatdoc::store", collection = name, "registered collection");
        Ok(engine)
    }

    /// Lists the collection names present in the backend's snapshot.
    ///
    /// # Errors
    ///
    /// Fails if the backend is disconnected or cannot be read.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        if !self.inner.backend.is_connected() {
            return Err(DocumentStoreError::ConnectionNotEstablished);
        }

        Ok(self
            .inner
            .backend
            .load(false)
            .await?
            .into_keys()
            .collect())
    }

    /// Removes every document of every collection, in the backend and in every
    /// registered collection.
    ///
    /// # Errors
    ///
    /// Fails if the backend is disconnected or cannot be written.
    pub async fn drop_database(&self) -> DocumentStoreResult<()> {
        if !self.inner.backend.is_connected() {
            return Err(DocumentStoreError::ConnectionNotEstablished);
        }

        self.inner.backend.drop_database().await?;

        for engine in self.inner.engines.read().await.values() {
            engine.reset().await;
        }

        info!(target: "flatdoc::store", "dropped database");
        Ok(())
    }

    /// Disconnects the backend and forgets every registered collection.
    ///
    /// Handles obtained earlier fail with
    /// [`ConnectionNotEstablished`](DocumentStoreError::ConnectionNotEstablished) afterwards.
    ///
    /// # Errors
    ///
    /// Fails if the backend fails to release its resources.
    pub async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.inner.backend.disconnect().await?;
        self.inner.engines.write().await.clear();

        info!(target: "flatdoc::store", "store shut down");
        Ok(())
    }
}
