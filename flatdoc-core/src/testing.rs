use async_trait::async_trait;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use crate::{
    backend::{CollectionMap, Snapshot, StoreBackend},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Snapshot backend kept entirely in memory, with switches for failure paths.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryBackend {
    snapshot: Arc<Mutex<Snapshot>>,
    disconnected: Arc<AtomicBool>,
    fail_saves: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub(crate) fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().unwrap().clone()
    }

    /// Replaces a collection behind the engines' backs, like another process would.
    pub(crate) fn overwrite(&self, collection: &str, documents: CollectionMap) {
        self.snapshot
            .lock()
            .unwrap()
            .insert(collection.to_string(), documents);
    }

    pub(crate) fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check(&self) -> DocumentStoreResult<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(DocumentStoreError::ConnectionNotEstablished);
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn load(&self, _force: bool) -> DocumentStoreResult<Snapshot> {
        self.check()?;
        Ok(self.snapshot())
    }

    async fn save(&self, collection: &str, documents: &CollectionMap) -> DocumentStoreResult<()> {
        self.check()?;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(DocumentStoreError::Io("disk full".to_string()));
        }

        self.overwrite(collection, documents.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn drop_database(&self) -> DocumentStoreResult<()> {
        self.check()?;
        for documents in self.snapshot.lock().unwrap().values_mut() {
            documents.clear();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> DocumentStoreResult<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}
