//! Error types and result types for document store operations.
//!
//! Misuse (a missing connection, an unsupported operator, a malformed document) is
//! reported through [`DocumentStoreError`]. Absence is not an error: lookups return
//! `Option` and mutations return zero counts when nothing matched.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// An operation reached the persistence backend before a connection was configured,
    /// or after it was shut down.
    #[error("Connection not established: configure a store path and connect before use")]
    ConnectionNotEstablished,
    /// The configured data file path is not acceptable (for example, wrong extension).
    #[error("Invalid data file path: {0}")]
    InvalidPath(String),
    /// A `$`-prefixed key other than `$where` or `$set` appeared in a filter or update document.
    #[error("This query is not supported yet: {0}")]
    UnsupportedQueryOperator(String),
    /// A filter or update document has a shape that cannot be resolved (for example,
    /// an operator envelope whose payload is not an object).
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    /// A collection was requested with an unusable name.
    #[error("Invalid collection name: {0:?}")]
    InvalidCollectionName(String),
    /// The document violates the factory's constraints or has invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// Serialization/deserialization error when converting between document formats (JSON, BSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<IoError> for DocumentStoreError {
    fn from(err: IoError) -> Self {
        DocumentStoreError::Io(err.to_string())
    }
}
