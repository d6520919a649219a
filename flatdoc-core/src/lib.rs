//! Core of flatdoc, a small embedded JSON document store.
//!
//! Documents are grouped into named collections, addressed by a string identity stored
//! under `_id`, and persisted as one snapshot per store. This crate provides:
//!
//! - **Documents** ([`document`]) - Field maps, models and document factories
//! - **Identities** ([`identity`]) - Opaque document identities and their generators
//! - **Backend abstraction** ([`backend`]) - The snapshot persistence contract
//! - **Queries** ([`query`]) - Filter/update resolution and operation results
//! - **Matching** ([`matcher`]) - Equality predicates over stored documents
//! - **Collections** ([`collection`]) - The per-collection engine and its handles
//! - **Document store** ([`store`]) - The collection registry bound to one backend
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use flatdoc_core::{document::Model, identity::Identity, store::DocumentStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: Identity,
//!     pub name: String,
//! }
//!
//! impl Model for User {
//!     fn id(&self) -> &Identity {
//!         &self.id
//!     }
//!
//!     fn collection_name() -> &'static str {
//!         "User"
//!     }
//! }
//!
//! let users = DocumentStore::new(backend).typed_collection::<User>().await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as flatdoc_core;

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod identity;
pub mod matcher;
pub mod query;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
