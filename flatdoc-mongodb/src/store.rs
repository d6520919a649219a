use async_trait::async_trait;
use bson::{Bson, Document, de::deserialize_from_bson, doc, ser::serialize_to_bson};
use futures::TryStreamExt;
use mea::rwlock::RwLock;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind},
    options::ClientOptions,
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{debug, info};

use flatdoc_core::{
    backend::{CollectionMap, Snapshot, StoreBackend, StoreBackendBuilder},
    document::{Fields, identity_of_fields},
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::sanitizer::KeySanitizer;

/// MongoDB reports this code when creating a collection that already exists.
const NAMESPACE_EXISTS: i32 = 48;

/// Snapshot backend persisting every collection to a MongoDB database.
///
/// Each store collection maps to the MongoDB collection of the same name, and each
/// document is stored with its identity as `_id`. Saving a collection replaces its
/// MongoDB contents (`deleteMany` followed by `insertMany`); the replacement is not
/// transactional.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
    connected: Arc<AtomicBool>,
    cache: Arc<RwLock<Option<Snapshot>>>,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self {
            client,
            database,
            connected: Arc::new(AtomicBool::new(true)),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&KeySanitizer::sanitize(collection_name))
    }

    fn ensure_connected(&self) -> DocumentStoreResult<()> {
        if !self.is_connected() {
            return Err(DocumentStoreError::ConnectionNotEstablished);
        }
        Ok(())
    }

    async fn read_snapshot(&self) -> DocumentStoreResult<Snapshot> {
        let names = self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        let mut snapshot = Snapshot::new();
        for name in names {
            let documents = self
                .get_collection(&name)
                .find(doc! {})
                .await
                .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
                .into_iter()
                .map(restore_document)
                .collect::<DocumentStoreResult<CollectionMap>>()?;

            snapshot.insert(KeySanitizer::restore(&name), documents);
        }

        Ok(snapshot)
    }

    async fn write_collection(&self, collection: &str, documents: &CollectionMap) -> DocumentStoreResult<()> {
        let target = self.get_collection(collection);

        target
            .delete_many(doc! {})
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        if documents.is_empty() {
            // Keep the collection listed so a reload still finds it.
            return match self
                .client
                .database(&self.database)
                .create_collection(&KeySanitizer::sanitize(collection))
                .await
            {
                Ok(()) => Ok(()),
                Err(err) if is_namespace_exists(&err) => Ok(()),
                Err(err) => Err(DocumentStoreError::Backend(err.to_string())),
            };
        }

        target
            .insert_many(
                documents
                    .values()
                    .map(prepare_document)
                    .collect::<DocumentStoreResult<Vec<Document>>>()?,
            )
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(())
    }
}

fn is_namespace_exists(err: &MongoError) -> bool {
    matches!(&*err.kind, ErrorKind::Command(command) if command.code == NAMESPACE_EXISTS)
}

fn prepare_document(fields: &Fields) -> DocumentStoreResult<Document> {
    match KeySanitizer::sanitize_value(serialize_to_bson(fields)?) {
        Bson::Document(document) => Ok(document),
        _ => Err(DocumentStoreError::InvalidDocument("Expected document".into())),
    }
}

fn restore_document(document: Document) -> DocumentStoreResult<(String, Fields)> {
    let fields: Fields = deserialize_from_bson(KeySanitizer::restore_value(Bson::Document(document)))?;

    let id = identity_of_fields(&fields)?.ok_or_else(|| {
        DocumentStoreError::InvalidDocument("stored document has no string `_id`".into())
    })?;

    Ok((id.into_string(), fields))
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn load(&self, force: bool) -> DocumentStoreResult<Snapshot> {
        self.ensure_connected()?;

        if !force {
            if let Some(snapshot) = self.cache.read().await.as_ref() {
                return Ok(snapshot.clone());
            }
        }

        let mut cache = self.cache.write().await;
        let snapshot = self.read_snapshot().await?;
        *cache = Some(snapshot.clone());

        debug!(
            target: "flatdoc::mongodb",
            database = %self.database,
            collections = snapshot.len(),
            "read snapshot"
        );
        Ok(snapshot)
    }

    async fn save(&self, collection: &str, documents: &CollectionMap) -> DocumentStoreResult<()> {
        self.ensure_connected()?;
        let mut cache = self.cache.write().await;

        self.write_collection(collection, documents).await?;

        if let Some(snapshot) = cache.as_mut() {
            snapshot.insert(collection.to_string(), documents.clone());
        }

        debug!(
            target: "flatdoc::mongodb",
            database = %self.database,
            collection,
            documents = documents.len(),
            "replaced collection"
        );
        Ok(())
    }

    async fn drop_database(&self) -> DocumentStoreResult<()> {
        self.ensure_connected()?;
        let mut cache = self.cache.write().await;

        let names = self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        for name in names {
            self.client
                .database(&self.database)
                .collection::<Document>(&name)
                .delete_many(doc! {})
                .await
                .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;
        }

        if let Some(snapshot) = cache.as_mut() {
            for documents in snapshot.values_mut() {
                documents.clear();
            }
        }

        info!(target: "flatdoc::mongodb", database = %self.database, "dropped every collection's documents");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn disconnect(&self) -> DocumentStoreResult<()> {
        if self.connected.swap(false, Ordering::AcqRel) {
            *self.cache.write().await = None;
            self.client.clone().shutdown().await;

            info!(target: "flatdoc::mongodb", database = %self.database, "disconnected");
        }

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        if self.database.is_empty() {
            return Err(DocumentStoreError::Initialization("database name must not be empty".into()));
        }

        let client = Client::with_options(
            ClientOptions::parse(&self.dsn)
                .await
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
        )
        .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        info!(target: "flatdoc::mongodb", database = %self.database, "connected");
        Ok(MongoDbStore::new(client, self.database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn documents_keep_identity_and_dotted_keys() {
        let stored = fields(json!({ "_id": "abc", "email": "a@x.com", "prefs": { "ui.theme": "dark" } }));

        let document = prepare_document(&stored).unwrap();
        assert_eq!(document.get_str("_id").unwrap(), "abc");
        assert_eq!(document.get_str("email").unwrap(), "a@x.com");
        assert!(document.get_document("prefs").unwrap().contains_key("ui__dot__theme"));

        let (id, restored) = restore_document(document).unwrap();
        assert_eq!(id, "abc");
        assert_eq!(Value::Object(restored), Value::Object(stored));
    }

    #[test]
    fn documents_without_identity_are_rejected() {
        assert!(restore_document(doc! { "name": "A" }).is_err());
    }
}
