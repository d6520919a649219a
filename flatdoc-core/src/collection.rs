//! Collection engine and collection handles.
//!
//! Every collection of a [`DocumentStore`](crate::store::DocumentStore) is backed by one
//! [`CollectionEngine`]: an in-memory, insertion-ordered map of the collection's documents
//! that is written through to the persistence backend after every mutation. Callers work
//! with a [`Collection`] handle, which pairs the shared engine with a
//! [`DocumentFactory`] deciding what a "document" is:
//!
//! - [`Collection`] (with the default [`RawFactory`]) - untyped [`RawDocument`]s
//! - [`TypedCollection`] - instances of a [`Model`] type
//!
//! Filters and update documents may be raw JSON or resolved [`Filter`]/[`Update`] values;
//! see [`query`](crate::query) for the accepted operator envelopes.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//!
//! let users = store.collection("User").await?;
//! let user = users.create(json!({ "email": "a@x.com", "name": "A" })).await?;
//!
//! let result = users
//!     .update_one(json!({ "email": "a@x.com" }), json!({ "$set": { "name": "B" } }), Default::default())
//!     .await?;
//! assert_eq!(result.n_modified, 1);
//!
//! let found = users.find_by_id(user.id()).await?;
//! ```

use serde_json::Value;
use mea::rwlock::RwLock;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::{
    backend::{CollectionMap, StoreBackend},
    document::{
        DocumentFactory, Fields, Model, ModelFactory, RawDocument, RawFactory,
        identity_of_fields, json_type,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    identity::{ID_FIELD, IdGenerator, Identity, ObjectIdGenerator},
    matcher::{select, strict_eq},
    query::{DeleteResult, Filter, IntoFilter, IntoUpdate, Update, UpdateOptions, UpdateResult},
};

/// Per-collection settings, shared by all handles of a collection.
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    /// Re-read the collection from durable storage (bypassing the backend cache) before
    /// every operation, instead of trusting the in-memory copy.
    pub refetch: bool,
    /// Source of identities for created documents.
    pub id_generator: Arc<dyn IdGenerator>,
}

impl CollectionOptions {
    pub fn refetch(mut self, refetch: bool) -> Self {
        self.refetch = refetch;
        self
    }

    pub fn id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Arc::new(id_generator);
        self
    }
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            refetch: false,
            id_generator: Arc::new(ObjectIdGenerator),
        }
    }
}

/// In-memory state of one collection, synchronized with the persistence backend.
///
/// Engines are created by the store's registry, once per collection name. Mutations hold
/// the engine's write lock until the backend has persisted the collection, so no two
/// mutations of a collection interleave.
#[derive(Debug)]
pub struct CollectionEngine {
    name: String,
    backend: Arc<dyn StoreBackend>,
    options: CollectionOptions,
    documents: RwLock<CollectionMap>,
}

impl CollectionEngine {
    /// Loads the collection, seeding and persisting an empty map if the snapshot lacks it.
    pub(crate) async fn initialize(
        name: &str,
        backend: Arc<dyn StoreBackend>,
        options: CollectionOptions,
    ) -> DocumentStoreResult<Self> {
        if !backend.is_connected() {
            return Err(DocumentStoreError::ConnectionNotEstablished);
        }

        let documents = match backend.load_collection(name, false).await? {
            Some(documents) => {
                debug!(
                    target: "flatdoc::collection",
                    collection = name,
                    documents = documents.len(),
                    "loaded collection"
                );
                documents
            }
            None => {
                let documents = CollectionMap::new();
                backend.save(name, &documents).await?;
                info!(target: "flatdoc::collection", collection = name, "initialized empty collection");
                documents
            }
        };

        Ok(Self {
            name: name.to_string(),
            backend,
            options,
            documents: RwLock::new(documents),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    /// Runs before every operation: checks the connection and honours `refetch`.
    async fn prepare(&self) -> DocumentStoreResult<()> {
        if !self.backend.is_connected() {
            return Err(DocumentStoreError::ConnectionNotEstablished);
        }

        if self.options.refetch {
            let reloaded = self
                .backend
                .load_collection(&self.name, true)
                .await?
                .unwrap_or_default();

            trace!(
                target: "flatdoc::collection",
                collection = %self.name,
                documents = reloaded.len(),
                "refetched collection"
            );
            *self.documents.write().await = reloaded;
        }

        Ok(())
    }

    async fn persist(&self, documents: &CollectionMap) -> DocumentStoreResult<()> {
        self.backend
            .save(&self.name, documents)
            .await?;

        debug!(
            target: "flatdoc::collection",
            collection = %self.name,
            documents = documents.len(),
            "persisted collection"
        );
        Ok(())
    }

    /// Persists `next` and only then makes it the in-memory collection, so a failed
    /// write leaves `documents` as it was.
    async fn commit(&self, documents: &mut CollectionMap, next: CollectionMap) -> DocumentStoreResult<()> {
        self.persist(&next).await?;
        *documents = next;
        Ok(())
    }

    /// Drops the in-memory documents without persisting; used after the backend was cleared.
    pub(crate) async fn reset(&self) {
        self.documents.write().await.clear();
    }
}

/// A handle to one collection, producing documents through the factory `F`.
///
/// Handles are cheap to clone; every handle of a collection shares the same engine.
#[derive(Debug, Clone)]
pub struct Collection<F: DocumentFactory = RawFactory> {
    engine: Arc<CollectionEngine>,
    factory: F,
}

/// A collection handle producing instances of the model `M`.
pub type TypedCollection<M> = Collection<ModelFactory<M>>;

impl<F: DocumentFactory> Collection<F> {
    pub(crate) fn new(engine: Arc<CollectionEngine>, factory: F) -> Self {
        Self { engine, factory }
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    /// Returns a handle to the same collection that produces documents through `factory`.
    pub fn with_factory<G: DocumentFactory>(&self, factory: G) -> Collection<G> {
        Collection::new(self.engine.clone(), factory)
    }

    /// Returns a handle to the same collection that produces `M` instances.
    pub fn with_type<M: Model>(&self) -> TypedCollection<M> {
        self.with_factory(ModelFactory::new())
    }

    /// Returns an untyped handle to the same collection.
    pub fn raw(&self) -> Collection<RawFactory> {
        self.with_factory(RawFactory)
    }

    /// Returns `true` if any document matches `filter`. The empty filter matches when
    /// the collection is not empty.
    ///
    /// # Errors
    ///
    /// Fails on an unresolvable filter or a disconnected backend.
    pub async fn exists(&self, filter: impl IntoFilter) -> DocumentStoreResult<bool> {
        let filter = filter.into_filter()?;
        self.engine.prepare().await?;
        let documents = self.engine.documents.read().await;

        Ok(if filter.is_empty() {
            !documents.is_empty()
        } else {
            !select(&documents, &filter, true).is_empty()
        })
    }

    /// Returns every document matching `filter`, in insertion order.
    /// The empty filter returns the whole collection.
    ///
    /// # Errors
    ///
    /// Fails on an unresolvable filter, a disconnected backend, or a stored document the
    /// factory rejects.
    pub async fn find(&self, filter: impl IntoFilter) -> DocumentStoreResult<Vec<F::Document>> {
        let filter = filter.into_filter()?;
        self.engine.prepare().await?;
        let documents = self.engine.documents.read().await;

        matching(&documents, &filter, false)
            .into_iter()
            .map(|(id, fields)| self.materialize(id, fields))
            .collect()
    }

    /// Returns the first document (in insertion order) matching `filter`, or `None`.
    ///
    /// An empty filter is almost always a mistake; it returns the first document of the
    /// collection and logs a warning.
    ///
    /// # Errors
    ///
    /// See [`find`](Self::find).
    pub async fn find_one(&self, filter: impl IntoFilter) -> DocumentStoreResult<Option<F::Document>> {
        let filter = filter.into_filter()?;
        self.engine.prepare().await?;
        let documents = self.engine.documents.read().await;

        first_match(&documents, &filter, self.name())
            .map(|(id, fields)| self.materialize(id, fields))
            .transpose()
    }

    /// Returns the document with identity `id`, or `None`.
    ///
    /// # Errors
    ///
    /// Fails on a disconnected backend or a stored document the factory rejects.
    pub async fn find_by_id(&self, id: impl Into<Identity>) -> DocumentStoreResult<Option<F::Document>> {
        let id = id.into();
        self.engine.prepare().await?;
        let documents = self.engine.documents.read().await;

        documents
            .get(id.as_str())
            .map(|fields| self.materialize(id.as_str(), fields))
            .transpose()
    }

    /// Counts the documents matching `filter`; the empty filter counts the collection.
    ///
    /// # Errors
    ///
    /// Fails on an unresolvable filter or a disconnected backend.
    pub async fn count(&self, filter: impl IntoFilter) -> DocumentStoreResult<usize> {
        let filter = filter.into_filter()?;
        self.engine.prepare().await?;
        let documents = self.engine.documents.read().await;

        Ok(matching(&documents, &filter, false).len())
    }

    /// Constructs a document from `payload` without storing it.
    ///
    /// The payload's `_id` is kept when present; otherwise a fresh identity is minted.
    ///
    /// # Errors
    ///
    /// Fails if the payload is not an object or the factory rejects it.
    pub fn build(&self, payload: impl Into<Value>) -> DocumentStoreResult<F::Document> {
        let (_, document, _) = self.prepare_payload(payload.into())?;

        Ok(document)
    }

    /// Creates and persists a document from `payload`.
    ///
    /// A fresh identity is minted unless the payload carries an `_id`; a caller-supplied
    /// identity that already exists replaces the stored document.
    ///
    /// # Errors
    ///
    /// Fails if the payload is not an object, the factory rejects it, or persisting fails.
    pub async fn create(&self, payload: impl Into<Value>) -> DocumentStoreResult<F::Document> {
        let (id, document, fields) = self.prepare_payload(payload.into())?;
        self.engine.prepare().await?;
        let mut documents = self.engine.documents.write().await;
        let mut next = documents.clone();

        if next
            .insert(id.to_string(), fields)
            .is_some()
        {
            debug!(
                target: "flatdoc::collection",
                collection = %self.name(),
                id = %id,
                "create replaced an existing document"
            );
        }

        self.engine.commit(&mut documents, next).await?;
        Ok(document)
    }

    /// Creates every payload as one batch.
    ///
    /// All payloads are constructed before any is stored, and the collection is persisted
    /// once. If any payload is rejected, or persisting fails, the collection is unchanged.
    ///
    /// # Errors
    ///
    /// See [`create`](Self::create).
    pub async fn create_many<P>(&self, payloads: impl IntoIterator<Item = P>) -> DocumentStoreResult<Vec<F::Document>>
    where
        P: Into<Value>,
    {
        let prepared = payloads
            .into_iter()
            .map(|payload| self.prepare_payload(payload.into()))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.engine.prepare().await?;
        let mut documents = self.engine.documents.write().await;
        let mut next = documents.clone();
        let mut created = Vec::with_capacity(prepared.len());

        for (id, document, fields) in prepared {
            next.insert(id.into_string(), fields);
            created.push(document);
        }

        self.engine.commit(&mut documents, next).await?;

        Ok(created)
    }

    /// Updates the first document matching `filter`.
    ///
    /// The resolved update fields are shallow-merged onto a copy of the stored document,
    /// which is rebuilt through the factory before it is stored. `_id` is never changed.
    /// Returns `{ n: 1, nModified: 1, ok: 1 }` when a document matched and zero counts
    /// otherwise (unless `options.upsert` creates one).
    ///
    /// # Errors
    ///
    /// Fails on an unresolvable filter or update, a document the factory rejects, or a
    /// persistence failure.
    pub async fn update_one(
        &self,
        filter: impl IntoFilter,
        update: impl IntoUpdate,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        let filter = filter.into_filter()?;
        let update = update.into_update()?;
        self.engine.prepare().await?;
        let mut documents = self.engine.documents.write().await;

        let found = first_match(&documents, &filter, self.name())
            .map(|(id, fields)| (id.clone(), fields.clone()));
        let Some((id, stored)) = found else {
            return self
                .upsert(&mut documents, filter, update, options)
                .await;
        };

        let (merged, _) = self.merge(&id, &stored, &update);
        let (_, fields) = self.normalize(merged, &Identity::new(id.as_str()))?;
        let mut next = documents.clone();
        next.insert(id, fields);

        self.engine.commit(&mut documents, next).await?;
        Ok(UpdateResult::matched(1, 1))
    }

    /// Updates every document matching `filter` (the empty filter matches all).
    ///
    /// `n` counts the matches; `nModified` counts only documents where at least one
    /// resolved field differed from the stored value.
    ///
    /// # Errors
    ///
    /// See [`update_one`](Self::update_one).
    pub async fn update_many(
        &self,
        filter: impl IntoFilter,
        update: impl IntoUpdate,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        let filter = filter.into_filter()?;
        let update = update.into_update()?;
        self.engine.prepare().await?;
        let mut documents = self.engine.documents.write().await;

        let matched = owned(matching(&documents, &filter, false));
        if matched.is_empty() {
            return self
                .upsert(&mut documents, filter, update, options)
                .await;
        }

        let mut modified = Vec::new();
        for (id, stored) in &matched {
            let (merged, changed) = self.merge(id, stored, &update);

            if changed {
                let (_, fields) = self.normalize(merged, &Identity::new(id.as_str()))?;
                modified.push((id.clone(), fields));
            }
        }

        let n_modified = modified.len() as u64;
        if !modified.is_empty() {
            let mut next = documents.clone();
            next.extend(modified);
            self.engine.commit(&mut documents, next).await?;
        }

        Ok(UpdateResult::matched(matched.len() as u64, n_modified))
    }

    /// Like [`update_many`](Self::update_many), but applies the change to the first match
    /// only. `n` still reports the full number of matches.
    ///
    /// # Errors
    ///
    /// See [`update_one`](Self::update_one).
    pub async fn update(
        &self,
        filter: impl IntoFilter,
        update: impl IntoUpdate,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        let filter = filter.into_filter()?;
        let update = update.into_update()?;
        self.engine.prepare().await?;
        let mut documents = self.engine.documents.write().await;

        let matched = owned(matching(&documents, &filter, false));
        let Some((id, stored)) = matched.first() else {
            return self
                .upsert(&mut documents, filter, update, options)
                .await;
        };

        let (merged, changed) = self.merge(id, stored, &update);
        let mut n_modified = 0;

        if changed {
            let (_, fields) = self.normalize(merged, &Identity::new(id.as_str()))?;
            let mut next = documents.clone();
            next.insert(id.clone(), fields);
            self.engine.commit(&mut documents, next).await?;
            n_modified = 1;
        }

        Ok(UpdateResult::matched(matched.len() as u64, n_modified))
    }

    /// Removes the first document matching `filter`.
    ///
    /// Returns `{ deletedCount: 0, ok: 0, n: 0 }` when nothing matched, so repeating a
    /// delete is a no-op.
    ///
    /// # Errors
    ///
    /// Fails on an unresolvable filter or a persistence failure.
    pub async fn delete_one(&self, filter: impl IntoFilter) -> DocumentStoreResult<DeleteResult> {
        let filter = filter.into_filter()?;
        self.engine.prepare().await?;
        let mut documents = self.engine.documents.write().await;

        let found = first_match(&documents, &filter, self.name()).map(|(id, _)| id.clone());
        let Some(id) = found else {
            return Ok(DeleteResult::none());
        };

        let mut next = documents.clone();
        next.shift_remove(&id);
        self.engine.commit(&mut documents, next).await?;

        Ok(DeleteResult::deleted(1))
    }

    /// Removes every document matching `filter` (the empty filter matches all).
    ///
    /// # Errors
    ///
    /// Fails on an unresolvable filter or a persistence failure.
    pub async fn delete_many(&self, filter: impl IntoFilter) -> DocumentStoreResult<DeleteResult> {
        let filter = filter.into_filter()?;
        self.engine.prepare().await?;
        let mut documents = self.engine.documents.write().await;

        let ids = matching(&documents, &filter, false)
            .into_iter()
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();

        if ids.is_empty() {
            return Ok(DeleteResult::none());
        }

        let mut next = documents.clone();
        for id in &ids {
            next.shift_remove(id);
        }
        self.engine.commit(&mut documents, next).await?;

        Ok(DeleteResult::deleted(ids.len() as u64))
    }

    /// Removes the document with identity `id` and returns it, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Fails on a persistence failure or if the removed document is rejected by the factory.
    pub async fn find_by_id_and_remove(
        &self,
        id: impl Into<Identity>,
    ) -> DocumentStoreResult<Option<F::Document>> {
        let id = id.into();
        self.engine.prepare().await?;
        let mut documents = self.engine.documents.write().await;

        let mut next = documents.clone();
        let Some(fields) = next.shift_remove(id.as_str()) else {
            return Ok(None);
        };

        self.engine.commit(&mut documents, next).await?;
        self.materialize(id.as_str(), &fields).map(Some)
    }

    /// Removes every document of the collection and persists the empty collection.
    ///
    /// # Errors
    ///
    /// Fails on a persistence failure.
    pub async fn clear_database(&self) -> DocumentStoreResult<()> {
        self.engine.prepare().await?;
        let mut documents = self.engine.documents.write().await;

        self.engine
            .commit(&mut documents, CollectionMap::new())
            .await?;

        info!(target: "flatdoc::collection", collection = %self.name(), "cleared collection");
        Ok(())
    }

    /// Persists the collection as it is in memory, after refetching it when the collection
    /// is configured to. Every mutating operation already does this; calling it again is
    /// harmless.
    ///
    /// # Errors
    ///
    /// Fails on a persistence failure.
    pub async fn save(&self) -> DocumentStoreResult<()> {
        self.engine.prepare().await?;
        let documents = self.engine.documents.read().await;
        self.engine.persist(&documents).await
    }

    /// Stores `document` under its identity (inserting or replacing) and persists.
    ///
    /// # Errors
    ///
    /// Fails if the document does not serialize to fields carrying its identity, or on a
    /// persistence failure.
    pub async fn save_document(&self, document: &F::Document) -> DocumentStoreResult<()> {
        let id = self.factory.identity_of(document);
        let fields = self.checked_fields(document, &id)?;
        self.engine.prepare().await?;
        let mut documents = self.engine.documents.write().await;

        let mut next = documents.clone();
        next.insert(id.into_string(), fields);
        self.engine.commit(&mut documents, next).await
    }

    /// Removes `document` (by identity). Returns whether it was stored.
    ///
    /// # Errors
    ///
    /// Fails on a persistence failure.
    pub async fn remove_document(&self, document: &F::Document) -> DocumentStoreResult<bool> {
        let id = self.factory.identity_of(document);
        self.engine.prepare().await?;
        let mut documents = self.engine.documents.write().await;

        let mut next = documents.clone();
        if next.shift_remove(id.as_str()).is_none() {
            return Ok(false);
        }

        self.engine.commit(&mut documents, next).await?;
        Ok(true)
    }

    fn materialize(&self, id: &str, fields: &Fields) -> DocumentStoreResult<F::Document> {
        self.factory
            .construct(fields.clone(), self.name(), &Identity::new(id))
    }

    /// Builds a document through the factory and returns it with the fields to store.
    fn normalize(&self, fields: Fields, id: &Identity) -> DocumentStoreResult<(F::Document, Fields)> {
        let document = self
            .factory
            .construct(fields, self.name(), id)?;
        let fields = self.checked_fields(&document, id)?;

        Ok((document, fields))
    }

    fn checked_fields(&self, document: &F::Document, id: &Identity) -> DocumentStoreResult<Fields> {
        let fields = self.factory.fields_of(document)?;

        match identity_of_fields(&fields)? {
            Some(stored) if &stored == id => Ok(fields),
            _ => Err(DocumentStoreError::InvalidDocument(format!(
                "documents of {} must serialize their identity {id} as `{ID_FIELD}`",
                self.name(),
            ))),
        }
    }

    fn prepare_payload(&self, payload: Value) -> DocumentStoreResult<(Identity, F::Document, Fields)> {
        let fields = match payload {
            Value::Object(fields) => fields,
            other => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "payload must be an object, found {}",
                    json_type(&other),
                )));
            }
        };

        let id = match identity_of_fields(&fields)? {
            Some(id) => id,
            None => self.engine.options.id_generator.next_id(),
        };
        let (document, fields) = self.normalize(fields, &id)?;

        Ok((id, document, fields))
    }

    /// Shallow-merges `update` onto a copy of `stored`, never touching `_id`.
    /// Returns the merged fields and whether any value changed.
    fn merge(&self, id: &str, stored: &Fields, update: &Update) -> (Fields, bool) {
        let mut merged = stored.clone();
        let mut changed = false;

        for (field, value) in update.fields() {
            if field == ID_FIELD {
                if value.as_str() != Some(id) {
                    debug!(
                        target: "flatdoc::collection",
                        collection = %self.name(),
                        id,
                        "ignoring attempt to change a document identity"
                    );
                }
                continue;
            }

            if !merged
                .get(field)
                .is_some_and(|current| strict_eq(current, value))
            {
                changed = true;
                merged.insert(field.clone(), value.clone());
            }
        }

        (merged, changed)
    }

    async fn upsert(
        &self,
        documents: &mut CollectionMap,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        if !options.upsert {
            return Ok(UpdateResult::none());
        }

        let id = match filter.identity()? {
            Some(id) => id,
            None => self.engine.options.id_generator.next_id(),
        };

        let mut seed = filter.into_fields();
        seed.remove(ID_FIELD);
        let (seed, _) = self.merge(id.as_str(), &seed, &update);
        let (_, fields) = self.normalize(seed, &id)?;

        let mut next = documents.clone();
        next.insert(id.to_string(), fields);
        self.engine.commit(documents, next).await?;

        Ok(UpdateResult::upserted(id))
    }
}

/// Matches `filter`, treating the empty filter as "everything".
fn matching<'a>(
    documents: &'a CollectionMap,
    filter: &Filter,
    first_only: bool,
) -> Vec<(&'a String, &'a Fields)> {
    if filter.is_empty() {
        let all = documents.iter();
        return if first_only { all.take(1).collect() } else { all.collect() };
    }

    select(documents, filter, first_only)
}

fn first_match<'a>(
    documents: &'a CollectionMap,
    filter: &Filter,
    collection: &str,
) -> Option<(&'a String, &'a Fields)> {
    if filter.is_empty() {
        warn!(
            target: "flatdoc::collection",
            collection,
            "single-document operation called with an empty filter; using the first document"
        );
    }

    matching(documents, filter, true)
        .into_iter()
        .next()
}

fn owned(matched: Vec<(&String, &Fields)>) -> Vec<(String, Fields)> {
    matched
        .into_iter()
        .map(|(id, fields)| (id.clone(), fields.clone()))
        .collect()
}

impl Collection<RawFactory> {
    /// Convenience for reading one field of the first match as raw JSON.
    pub async fn find_value(&self, filter: impl IntoFilter, field: &str) -> DocumentStoreResult<Option<Value>> {
        Ok(self
            .find_one(filter)
            .await?
            .and_then(|document: RawDocument| document.get(field).cloned()))
    }
}
