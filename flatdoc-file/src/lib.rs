//! JSON file storage backend for flatdoc.
//!
//! This crate provides [`FileStore`], a [`StoreBackend`](flatdoc_core::backend::StoreBackend)
//! that keeps the whole snapshot in a single JSON file. It is meant for development,
//! tests and small single-process deployments.
//!
//! # Features
//!
//! - **Cached reads** - The file is read once and then served from memory until a forced reload
//! - **Full rewrites** - Every save writes the complete snapshot synchronously
//! - **Ordered output** - Collection and document order survive a save/load round trip
//!
//! # Quick Start
//!
//! ```ignore
//! use flatdoc::{DocumentStore, file::FileStore, backend::StoreBackendBuilder};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = FileStore::builder().path("db.json").build().await?;
//!     let store = DocumentStore::new(backend);
//!
//!     let users = store.collection("User").await?;
//!     users.create(json!({ "name": "Alice" })).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as flatdoc_file;

pub mod store;

pub use store::{FileStore, FileStoreBuilder};
