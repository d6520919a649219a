//! Persistence backend abstraction.
//!
//! A backend persists the whole [`Snapshot`]: a map from collection name to that
//! collection's documents, keyed by identity. Collection engines keep their own
//! in-memory copy and hand the complete collection to [`StoreBackend::save`] after
//! every mutation; there is no incremental persistence.
//!
//! Backends keep a single cache of the snapshot. [`StoreBackend::load`] returns the cache
//! unless asked to re-read, and every save updates the cache before writing through.
//!
//! # Traits
//!
//! - [`StoreBackend`]: the persistence contract
//! - [`StoreBackendBuilder`]: factory trait for creating backend instances

use async_trait::async_trait;
use indexmap::IndexMap;
use std::{fmt::Debug, sync::Arc};

use crate::{document::Fields, error::DocumentStoreResult};

/// One collection's documents, keyed by identity, in insertion order.
pub type CollectionMap = IndexMap<String, Fields>;

/// Every collection of a store, keyed by collection name, in insertion order.
pub type Snapshot = IndexMap<String, CollectionMap>;

/// Abstract interface for snapshot persistence.
///
/// # Concurrency
///
/// Implementations are shared by every collection engine of a store and must be
/// `Send + Sync`. The store assumes a single writer per collection; backends only need
/// to keep their cache consistent, not to arbitrate between writers.
///
/// # Errors
///
/// Every method returns [`DocumentStoreError::ConnectionNotEstablished`](crate::error::DocumentStoreError::ConnectionNotEstablished)
/// once the backend has been disconnected.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the full snapshot.
    ///
    /// Serves the cache when one is present and `force` is `false`; otherwise re-reads
    /// durable storage and refreshes the cache. Empty or missing storage yields an empty
    /// snapshot rather than an error.
    async fn load(&self, force: bool) -> DocumentStoreResult<Snapshot>;

    /// Returns one collection of the snapshot, if present.
    ///
    /// The default implementation loads the full snapshot; backends can avoid the copy.
    async fn load_collection(
        &self,
        collection: &str,
        force: bool,
    ) -> DocumentStoreResult<Option<CollectionMap>> {
        Ok(self
            .load(force)
            .await?
            .shift_remove(collection))
    }

    /// Replaces `collection` in the snapshot with `documents` and persists the result.
    async fn save(&self, collection: &str, documents: &CollectionMap) -> DocumentStoreResult<()>;

    /// Removes every document of every collection, keeping the collections themselves.
    async fn drop_database(&self) -> DocumentStoreResult<()>;

    /// Whether the backend still accepts operations.
    fn is_connected(&self) -> bool {
        true
    }

    /// Releases the backend. Subsequent operations fail with `ConnectionNotEstablished`.
    ///
    /// The default implementation is a no-op.
    async fn disconnect(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend + ?Sized,
{
    async fn load(&self, force: bool) -> DocumentStoreResult<Snapshot> {
        (**self).load(force).await
    }

    async fn load_collection(
        &self,
        collection: &str,
        force: bool,
    ) -> DocumentStoreResult<Option<CollectionMap>> {
        (**self)
            .load_collection(collection, force)
            .await
    }

    async fn save(&self, collection: &str, documents: &CollectionMap) -> DocumentStoreResult<()> {
        (**self)
            .save(collection, documents)
            .await
    }

    async fn drop_database(&self) -> DocumentStoreResult<()> {
        (**self).drop_database().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn disconnect(&self) -> DocumentStoreResult<()> {
        (**self).disconnect().await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
