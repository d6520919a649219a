//! Startup backend selection.
//!
//! [`connect`] picks the persistence backend once, from [`ConnectOptions`], and returns a
//! [`DocumentStore`] bound to it. Nothing downstream branches on the dev/production
//! toggle again.

use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

use flatdoc_core::{
    backend::StoreBackendBuilder,
    collection::CollectionOptions,
    error::{DocumentStoreError, DocumentStoreResult},
    identity::{ObjectIdGenerator, UuidGenerator},
    store::DocumentStore,
};
use flatdoc_file::FileStore;

/// How identities are minted for created documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// 24-character hex ObjectIds, which embed their creation time.
    #[default]
    ObjectId,
    /// Random (v4) UUIDs.
    Uuid,
}

/// Connection settings, deserializable from an application's configuration.
///
/// ```ignore
/// let options: ConnectOptions = serde_json::from_str(r#"{ "dev": true, "file_path": "db.json" }"#)?;
/// let store = flatdoc::connect(options).await?;
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Use the JSON file backend instead of MongoDB.
    pub dev: bool,
    /// Data file for the file backend; must end in `.json`.
    pub file_path: Option<PathBuf>,
    /// Pretty-print the data file.
    pub pretty: bool,
    /// Connection string for the MongoDB backend.
    pub mongo_uri: Option<String>,
    /// Database name for the MongoDB backend.
    pub database: Option<String>,
    /// Re-read every collection from storage before each operation.
    pub refetch: bool,
    pub id_strategy: IdStrategy,
}

impl ConnectOptions {
    /// Options for the file backend at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            dev: true,
            file_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Options for the MongoDB backend.
    pub fn mongodb(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            dev: false,
            mongo_uri: Some(uri.into()),
            database: Some(database.into()),
            ..Self::default()
        }
    }

    fn collection_options(&self) -> CollectionOptions {
        let options = CollectionOptions::default().refetch(self.refetch);

        match self.id_strategy {
            IdStrategy::ObjectId => options.id_generator(ObjectIdGenerator),
            IdStrategy::Uuid => options.id_generator(UuidGenerator),
        }
    }
}

/// Builds the configured backend and returns a store bound to it.
///
/// # Errors
///
/// - [`DocumentStoreError::ConnectionNotEstablished`] when the selected backend is missing
///   its path or connection string
/// - [`DocumentStoreError::InvalidPath`] when the data file does not end in `.json`
/// - [`DocumentStoreError::Initialization`] when MongoDB is selected but the `mongodb`
///   feature is disabled, or the client cannot be created
pub async fn connect(options: ConnectOptions) -> DocumentStoreResult<DocumentStore> {
    let collection_options = options.collection_options();

    if options.dev {
        let path = options
            .file_path
            .ok_or(DocumentStoreError::ConnectionNotEstablished)?;
        let backend = FileStore::builder()
            .path(path)
            .pretty(options.pretty)
            .build()
            .await?;

        info!(target: "flatdoc::connect", path = %backend.path().display(), "using file backend");
        return Ok(DocumentStore::with_options(backend, collection_options));
    }

    connect_mongodb(options, collection_options).await
}

#[cfg(feature = "mongodb")]
async fn connect_mongodb(
    options: ConnectOptions,
    collection_options: CollectionOptions,
) -> DocumentStoreResult<DocumentStore> {
    use flatdoc_mongodb::MongoDbStore;

    let uri = options
        .mongo_uri
        .ok_or(DocumentStoreError::ConnectionNotEstablished)?;
    let database = options
        .database
        .ok_or_else(|| DocumentStoreError::Initialization("database name is required".into()))?;

    let backend = MongoDbStore::builder(&uri, &database)
        .build()
        .await?;

    info!(target: "flatdoc::connect", database = %database, "using mongodb backend");
    Ok(DocumentStore::with_options(backend, collection_options))
}

#[cfg(not(feature = "mongodb"))]
async fn connect_mongodb(
    _options: ConnectOptions,
    _collection_options: CollectionOptions,
) -> DocumentStoreResult<DocumentStore> {
    Err(DocumentStoreError::Initialization(
        "the MongoDB backend requires the `mongodb` feature".into(),
    ))
}
