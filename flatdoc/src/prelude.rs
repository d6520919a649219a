//! Convenient re-exports of commonly used types from flatdoc.
//!
//! ```ignore
//! use flatdoc::prelude::*;
//! ```

pub use flatdoc_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::{Collection, CollectionOptions, TypedCollection},
    document::{DocumentFactory, Fields, Model, ModelExt, RawDocument},
    error::{DocumentStoreError, DocumentStoreResult},
    identity::Identity,
    query::{DeleteResult, Filter, Update, UpdateOptions, UpdateResult},
    store::DocumentStore,
};
pub use flatdoc_file::FileStore;
pub use flatdoc_macros::Model;

pub use crate::connect::{ConnectOptions, IdStrategy, connect};
