//! MongoDB backend implementation for flatdoc.
//!
//! This crate provides [`MongoDbStore`], a snapshot backend that keeps each collection in
//! the MongoDB collection of the same name. It is the production counterpart of the JSON
//! file backend: collection engines behave identically on top of either.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! flatdoc = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use flatdoc::{DocumentStore, backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let store = DocumentStore::new(backend);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as flatdoc_mongodb;

pub mod store;
pub(crate) mod sanitizer;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
