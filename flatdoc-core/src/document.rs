//! Core traits and types for document representation and construction.
//!
//! Documents are stored as ordered JSON objects ([`Fields`]) that always carry their
//! identity under [`ID_FIELD`]. A [`DocumentFactory`] turns stored fields back into the
//! document type a caller works with:
//!
//! - [`RawFactory`] produces untyped [`RawDocument`]s
//! - [`ModelFactory`] produces instances of a [`Model`] type through serde
//!
//! # Example
//!
//! ```ignore
//! use flatdoc::{Identity, Model};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Model)]
//! #[model(collection = "User")]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     #[model(id)]
//!     pub id: Identity,
//!     pub email: String,
//!     pub name: String,
//! }
//! ```

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, from_value, to_value};
use std::{fmt::Debug, marker::PhantomData};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    identity::{ID_FIELD, Identity},
};

/// The field map of a single stored document. Key order is preserved.
pub type Fields = Map<String, Value>;

/// Core trait that all typed documents must implement.
///
/// The type's serde representation must be a JSON object that carries the identity
/// under `_id`; `#[serde(rename = "_id")]` on the identity field does this.
/// `#[derive(Model)]` implements this trait from field attributes.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + Clone + Debug + 'static {
    /// Returns a reference to this document's identity.
    fn id(&self) -> &Identity;

    /// Returns the name of the collection this document belongs to.
    fn collection_name() -> &'static str;
}

/// Extension trait converting models to and from stored fields.
///
/// This trait is automatically implemented for all types that implement [`Model`].
pub trait ModelExt: Model {
    /// Serializes this document into its stored field map.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or does not produce a JSON object.
    fn to_fields(&self) -> DocumentStoreResult<Fields>;

    /// Builds a document from a stored field map.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields do not deserialize into `Self`.
    fn from_fields(fields: Fields) -> DocumentStoreResult<Self>;
}

impl<M: Model> ModelExt for M {
    fn to_fields(&self) -> DocumentStoreResult<Fields> {
        match to_value(self)? {
            Value::Object(fields) => Ok(fields),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "{} serialized to {} instead of an object",
                M::collection_name(),
                json_type(&other),
            ))),
        }
    }

    fn from_fields(fields: Fields) -> DocumentStoreResult<Self> {
        Ok(from_value(Value::Object(fields))?)
    }
}

/// An untyped document: its identity plus the full field map (including `_id`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawDocument {
    #[serde(skip)]
    id: Identity,
    #[serde(flatten)]
    fields: Fields,
}

impl RawDocument {
    pub fn id(&self) -> &Identity {
        &self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }
}

/// Builds caller-facing documents from stored field maps.
///
/// The collection engine calls [`construct`](DocumentFactory::construct) when a document
/// is created or updated (so the factory can normalize or reject it) and whenever a stored
/// document is handed back to a caller.
pub trait DocumentFactory: Send + Sync {
    type Document: Send + Sync;

    /// Constructs a document from `fields`, stamping it with `id`.
    ///
    /// Any `_id` already present in `fields` is replaced by `id`.
    fn construct(
        &self,
        fields: Fields,
        collection: &str,
        id: &Identity,
    ) -> DocumentStoreResult<Self::Document>;

    /// Returns the field map to persist for `document`.
    fn fields_of(&self, document: &Self::Document) -> DocumentStoreResult<Fields>;

    /// Returns the identity of `document`.
    fn identity_of(&self, document: &Self::Document) -> Identity;
}

/// Factory for untyped [`RawDocument`]s. Performs no validation beyond identity stamping.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawFactory;

impl DocumentFactory for RawFactory {
    type Document = RawDocument;

    fn construct(
        &self,
        mut fields: Fields,
        _collection: &str,
        id: &Identity,
    ) -> DocumentStoreResult<RawDocument> {
        fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        Ok(RawDocument { id: id.clone(), fields })
    }

    fn fields_of(&self, document: &RawDocument) -> DocumentStoreResult<Fields> {
        Ok(document.fields.clone())
    }

    fn identity_of(&self, document: &RawDocument) -> Identity {
        document.id.clone()
    }
}

/// Factory for a [`Model`] type. Shape validation and defaulting are whatever the
/// model's `Deserialize` implementation does.
#[derive(Debug)]
pub struct ModelFactory<M: Model> {
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> ModelFactory<M> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<M: Model> Default for ModelFactory<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Clone for ModelFactory<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<M: Model> DocumentFactory for ModelFactory<M> {
    type Document = M;

    fn construct(
        &self,
        mut fields: Fields,
        collection: &str,
        id: &Identity,
    ) -> DocumentStoreResult<M> {
        fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        M::from_fields(fields).map_err(|err| {
            DocumentStoreError::InvalidDocument(format!("{collection}/{id}: {err}"))
        })
    }

    fn fields_of(&self, document: &M) -> DocumentStoreResult<Fields> {
        document.to_fields()
    }

    fn identity_of(&self, document: &M) -> Identity {
        document.id().clone()
    }
}

/// Reads the identity carried by a field map, if any.
///
/// A missing or `null` `_id` yields `None`.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] when `_id` is present but not a string.
pub fn identity_of_fields(fields: &Fields) -> DocumentStoreResult<Option<Identity>> {
    match fields.get(ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(Identity::new(id.as_str()))),
        Some(other) => Err(DocumentStoreError::InvalidDocument(format!(
            "`{ID_FIELD}` must be a string, found {}",
            json_type(other),
        ))),
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct User {
        #[serde(rename = "_id")]
        id: Identity,
        email: String,
        #[serde(default)]
        admin: bool,
    }

    impl Model for User {
        fn id(&self) -> &Identity {
            &self.id
        }

        fn collection_name() -> &'static str {
            "User"
        }
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn raw_factory_stamps_identity() {
        let id = Identity::new("abc");
        let doc = RawFactory
            .construct(fields(json!({ "_id": "other", "name": "A" })), "User", &id)
            .unwrap();

        assert_eq!(doc.id(), &id);
        assert_eq!(doc.get("_id"), Some(&json!("abc")));
        assert_eq!(doc.get("name"), Some(&json!("A")));
    }

    #[test]
    fn model_factory_applies_serde_defaults() {
        let id = Identity::new("abc");
        let user = ModelFactory::<User>::new()
            .construct(fields(json!({ "email": "a@x.com" })), "User", &id)
            .unwrap();

        assert_eq!(user.id, id);
        assert!(!user.admin);

        let stored = ModelFactory::<User>::new().fields_of(&user).unwrap();
        assert_eq!(Value::Object(stored), json!({ "_id": "abc", "email": "a@x.com", "admin": false }));
    }

    #[test]
    fn model_factory_rejects_wrong_shape() {
        let err = ModelFactory::<User>::new()
            .construct(fields(json!({ "email": 42 })), "User", &Identity::new("abc"))
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[test]
    fn identity_must_be_a_string() {
        assert_eq!(identity_of_fields(&fields(json!({ "a": 1 }))).unwrap(), None);
        assert_eq!(
            identity_of_fields(&fields(json!({ "_id": "x" }))).unwrap(),
            Some(Identity::new("x"))
        );
        assert!(identity_of_fields(&fields(json!({ "_id": 7 }))).is_err());
    }

    #[test]
    fn raw_document_serializes_as_its_fields() {
        let doc = RawFactory
            .construct(fields(json!({ "name": "A" })), "User", &Identity::new("abc"))
            .unwrap();

        assert_eq!(serde_json::to_value(&doc).unwrap(), json!({ "name": "A", "_id": "abc" }));
    }
}
