//! flatdoc: an embedded JSON document store.
//!
//! Documents live in named collections, carry a string identity under `_id`, and are
//! queried with flat equality filters. Every mutation is written through to the
//! persistence backend: a JSON file during development, or MongoDB in production
//! (with the `mongodb` feature).
//!
//! # Quick Start
//!
//! ```ignore
//! use flatdoc::{prelude::*, serde_json::json};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, flatdoc::Model)]
//! #[model(collection = "User")]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: Identity,
//!     pub email: String,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = connect(ConnectOptions::file("db.json")).await?;
//!     let users = store.typed_collection::<User>().await?;
//!
//!     let user = users.create(json!({ "email": "a@x.com", "name": "A" })).await?;
//!     users
//!         .update_one(
//!             json!({ "email": "a@x.com" }),
//!             json!({ "$set": { "name": "B" } }),
//!             UpdateOptions::default(),
//!         )
//!         .await?;
//!
//!     let user = users.find_by_id(&user.id).await?;
//!     println!("{user:?}");
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Filters and updates
//!
//! A filter maps field names to expected values, optionally wrapped as
//! `{ "$where": { ... } }`. An update either lists the fields to write directly or wraps
//! them as `{ "$set": { ... } }`. Any other `$` operator is rejected with
//! [`DocumentStoreError::UnsupportedQueryOperator`](error::DocumentStoreError::UnsupportedQueryOperator).
//!
//! # Backends
//!
//! - [`file`] - Single JSON file, for development and tests
//! - [`mongodb`] - MongoDB database (requires the `mongodb` feature)

pub mod connect;
pub mod prelude;

pub use flatdoc_core::{backend, collection, document, error, identity, matcher, query, store};

pub use flatdoc_core::{document::Model, identity::Identity, store::DocumentStore};
pub use flatdoc_macros::Model;

pub use connect::{ConnectOptions, IdStrategy, connect};

// Re-exported so callers can build filters with `json!` without another dependency.
pub use serde_json;

/// JSON file storage backend.
pub mod file {
    pub use flatdoc_file::{FileStore, FileStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use flatdoc_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
