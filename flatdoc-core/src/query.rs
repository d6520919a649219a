//! Filters, update documents and the result envelopes of write operations.
//!
//! Callers hand the engine loosely shaped JSON, as they would to a MongoDB driver.
//! Before any matching happens the JSON is resolved exactly once:
//!
//! - a filter becomes a [`Filter`]: a flat map of field equalities
//! - an update document becomes an [`Update`]: either [`Update::Set`] (from a `$set`
//!   envelope) or [`Update::Replace`] (the document's own top-level fields)
//!
//! Two operator envelopes are understood, in either position: `$where` and `$set`.
//! Any other `$`-prefixed key fails with
//! [`DocumentStoreError::UnsupportedQueryOperator`].
//!
//! # Example
//!
//! ```ignore
//! use flatdoc::query::{resolve, Filter};
//! use serde_json::json;
//!
//! let (filter, update) = resolve(
//!     json!({ "$where": { "email": "a@x.com" } }),
//!     json!({ "$set": { "name": "B" } }),
//! )?;
//!
//! assert_eq!(filter, Filter::eq("email", "a@x.com"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    document::{Fields, identity_of_fields, json_type},
    error::{DocumentStoreError, DocumentStoreResult},
    identity::{ID_FIELD, Identity},
};

/// Envelope wrapping a predicate: `{ "$where": { field: value } }`.
pub const WHERE_OPERATOR: &str = "$where";
/// Envelope wrapping the fields to assign: `{ "$set": { field: value } }`.
pub const SET_OPERATOR: &str = "$set";

const SUPPORTED_OPERATORS: [&str; 2] = [WHERE_OPERATOR, SET_OPERATOR];

/// A resolved equality predicate.
///
/// Every listed field must be present in a document and equal to the given value.
/// The empty filter is "match all" for the engine's multi-document operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Fields,
}

impl Filter {
    /// The empty filter.
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter requiring `field` to equal `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and_eq(field, value)
    }

    /// A filter selecting the document with identity `id`.
    pub fn by_id(id: impl Into<Identity>) -> Self {
        Self::eq(ID_FIELD, id.into().into_string())
    }

    /// Adds another equality requirement.
    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Resolves raw filter JSON, unwrapping a `$where` (or `$set`) envelope.
    ///
    /// `null` is accepted as the empty filter.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::UnsupportedQueryOperator`] for any other `$`-prefixed key,
    ///   including operator-shaped values such as `{ "age": { "$gt": 3 } }`
    /// - [`DocumentStoreError::InvalidFilter`] if the filter is not an object
    pub fn parse(raw: Value) -> DocumentStoreResult<Self> {
        let (_, fields) = unwrap_envelope(expect_object(raw, "filter")?, "filter")?;

        for (field, value) in &fields {
            if let Value::Object(inner) = value {
                if let Some(operator) = inner.keys().find(|key| key.starts_with('$')) {
                    return Err(DocumentStoreError::UnsupportedQueryOperator(format!(
                        "{operator} (on field `{field}`)"
                    )));
                }
            }
        }

        Ok(Self { fields })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// The identity this filter pins, if it names `_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] when `_id` is not a string.
    pub fn identity(&self) -> DocumentStoreResult<Option<Identity>> {
        identity_of_fields(&self.fields)
    }
}

impl TryFrom<Value> for Filter {
    type Error = DocumentStoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Filter::parse(value)
    }
}

/// A resolved update document.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Plain update document: its top-level fields overwrite the stored ones.
    Replace(Fields),
    /// `$set` envelope: only the nested fields are assigned.
    Set(Fields),
}

impl Update {
    /// Builds a `$set` update for a single field.
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = Fields::new();
        fields.insert(field.into(), value.into());
        Update::Set(fields)
    }

    /// Resolves a raw update document.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::UnsupportedQueryOperator`] for `$`-prefixed keys other
    ///   than `$set` and `$where`
    /// - [`DocumentStoreError::InvalidFilter`] if the document is not an object
    pub fn parse(raw: Value) -> DocumentStoreResult<Self> {
        let (operator, fields) = unwrap_envelope(expect_object(raw, "update")?, "update")?;

        Ok(match operator {
            Some(_) => Update::Set(fields),
            None => Update::Replace(fields),
        })
    }

    /// The fields this update assigns.
    pub fn fields(&self) -> &Fields {
        match self {
            Update::Replace(fields) | Update::Set(fields) => fields,
        }
    }

    pub fn into_fields(self) -> Fields {
        match self {
            Update::Replace(fields) | Update::Set(fields) => fields,
        }
    }
}

impl TryFrom<Value> for Update {
    type Error = DocumentStoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Update::parse(value)
    }
}

/// Anything the engine accepts as a filter: a resolved [`Filter`] or raw JSON.
pub trait IntoFilter {
    fn into_filter(self) -> DocumentStoreResult<Filter>;
}

impl IntoFilter for Filter {
    fn into_filter(self) -> DocumentStoreResult<Filter> {
        Ok(self)
    }
}

impl IntoFilter for &Filter {
    fn into_filter(self) -> DocumentStoreResult<Filter> {
        Ok(self.clone())
    }
}

impl IntoFilter for Value {
    fn into_filter(self) -> DocumentStoreResult<Filter> {
        Filter::parse(self)
    }
}

impl IntoFilter for Fields {
    fn into_filter(self) -> DocumentStoreResult<Filter> {
        Filter::parse(Value::Object(self))
    }
}

/// Anything the engine accepts as an update document: a resolved [`Update`] or raw JSON.
pub trait IntoUpdate {
    fn into_update(self) -> DocumentStoreResult<Update>;
}

impl IntoUpdate for Update {
    fn into_update(self) -> DocumentStoreResult<Update> {
        Ok(self)
    }
}

impl IntoUpdate for Value {
    fn into_update(self) -> DocumentStoreResult<Update> {
        Update::parse(self)
    }
}

impl IntoUpdate for Fields {
    fn into_update(self) -> DocumentStoreResult<Update> {
        Update::parse(Value::Object(self))
    }
}

/// Resolves a filter and an update document in one step.
///
/// # Errors
///
/// Fails if either side fails to resolve; see [`Filter::parse`] and [`Update::parse`].
pub fn resolve(filter: Value, update: Value) -> DocumentStoreResult<(Filter, Update)> {
    Ok((Filter::parse(filter)?, Update::parse(update)?))
}

/// Options accepted by the update operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    /// Create a document from the filter and update fields when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Outcome of an update: `{ n, nModified, ok }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    /// Number of documents matched by the filter.
    pub n: u64,
    /// Number of documents whose stored fields were written.
    pub n_modified: u64,
    /// `1` when the operation matched (or upserted) something, `0` otherwise.
    pub ok: u8,
    /// Identity of the document created by an upsert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<Identity>,
}

impl UpdateResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn matched(n: u64, n_modified: u64) -> Self {
        Self {
            n,
            n_modified,
            ok: u8::from(n > 0),
            upserted_id: None,
        }
    }

    pub fn upserted(id: Identity) -> Self {
        Self {
            n: 1,
            n_modified: 0,
            ok: 1,
            upserted_id: Some(id),
        }
    }
}

/// Outcome of a delete: `{ deletedCount, ok, n }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
    pub ok: u8,
    pub n: u64,
}

impl DeleteResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn deleted(count: u64) -> Self {
        Self {
            deleted_count: count,
            ok: u8::from(count > 0),
            n: count,
        }
    }
}

fn expect_object(raw: Value, context: &str) -> DocumentStoreResult<Fields> {
    match raw {
        Value::Object(fields) => Ok(fields),
        Value::Null => Ok(Fields::new()),
        other => Err(DocumentStoreError::InvalidFilter(format!(
            "{context} must be an object, found {}",
            json_type(&other),
        ))),
    }
}

/// Splits off a supported operator envelope, if one is present.
fn unwrap_envelope(
    mut raw: Fields,
    context: &str,
) -> DocumentStoreResult<(Option<&'static str>, Fields)> {
    let mut found = None;

    for key in raw.keys().filter(|key| key.starts_with('$')) {
        let operator = SUPPORTED_OPERATORS
            .iter()
            .copied()
            .find(|supported| *supported == key.as_str())
            .ok_or_else(|| DocumentStoreError::UnsupportedQueryOperator(key.clone()))?;

        if let Some(previous) = found.replace(operator) {
            return Err(DocumentStoreError::InvalidFilter(format!(
                "{context} combines the {previous} and {operator} envelopes"
            )));
        }
    }

    let Some(operator) = found else {
        return Ok((None, raw));
    };

    let inner = match raw.shift_remove(operator) {
        Some(Value::Object(inner)) => inner,
        Some(other) => {
            return Err(DocumentStoreError::InvalidFilter(format!(
                "{operator} expects an object, found {}",
                json_type(&other),
            )));
        }
        None => Fields::new(),
    };

    if !raw.is_empty() {
        warn!(
            target: "flatdoc::query",
            operator,
            ignored = ?raw.keys().collect::<Vec<_>>(),
            "ignoring fields next to an operator envelope in {context}"
        );
    }

    if let Some(nested) = inner.keys().find(|key| key.starts_with('$')) {
        return Err(DocumentStoreError::UnsupportedQueryOperator(nested.clone()));
    }

    Ok((Some(operator), inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_filter_is_kept_as_is() {
        let filter = Filter::parse(json!({ "email": "a@x.com", "age": 3 })).unwrap();

        assert_eq!(filter, Filter::eq("email", "a@x.com").and_eq("age", 3));
    }

    #[test]
    fn where_envelope_is_unwrapped() {
        let filter = Filter::parse(json!({ "$where": { "email": "a@x.com" } })).unwrap();

        assert_eq!(filter, Filter::eq("email", "a@x.com"));
    }

    #[test]
    fn null_filter_is_empty() {
        assert!(Filter::parse(Value::Null).unwrap().is_empty());
        assert!(Filter::parse(json!({})).unwrap().is_empty());
    }

    #[test]
    fn set_envelope_only_applies_nested_fields() {
        let update = Update::parse(json!({ "$set": { "name": "B" }, "email": "blank" })).unwrap();

        assert_eq!(update, Update::set("name", "B"));
    }

    #[test]
    fn plain_update_replaces_top_level_fields() {
        let update = Update::parse(json!({ "name": "C" })).unwrap();

        assert!(matches!(update, Update::Replace(_)));
        assert_eq!(update.fields().get("name"), Some(&json!("C")));
    }

    #[test]
    fn unsupported_operators_fail_fast() {
        let err = Update::parse(json!({ "$unsupportedOp": { "x": 1 } })).unwrap_err();
        assert!(matches!(err, DocumentStoreError::UnsupportedQueryOperator(op) if op == "$unsupportedOp"));

        let err = Filter::parse(json!({ "$or": [] })).unwrap_err();
        assert!(matches!(err, DocumentStoreError::UnsupportedQueryOperator(op) if op == "$or"));

        let err = Filter::parse(json!({ "age": { "$gt": 3 } })).unwrap_err();
        assert!(matches!(err, DocumentStoreError::UnsupportedQueryOperator(_)));

        let err = Filter::parse(json!({ "$where": { "$and": [] } })).unwrap_err();
        assert!(matches!(err, DocumentStoreError::UnsupportedQueryOperator(op) if op == "$and"));
    }

    #[test]
    fn malformed_envelopes_are_rejected() {
        assert!(matches!(
            Update::parse(json!({ "$set": 5 })),
            Err(DocumentStoreError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::parse(json!({ "$where": {}, "$set": {} })),
            Err(DocumentStoreError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::parse(json!([1, 2])),
            Err(DocumentStoreError::InvalidFilter(_))
        ));
    }

    #[test]
    fn by_id_filter_pins_identity() {
        let filter = Filter::by_id("abc");

        assert_eq!(filter.identity().unwrap(), Some(Identity::new("abc")));
        assert_eq!(Filter::eq("name", "A").identity().unwrap(), None);
    }

    #[test]
    fn result_envelopes_use_wire_names() {
        assert_eq!(
            serde_json::to_value(UpdateResult::matched(2, 1)).unwrap(),
            json!({ "n": 2, "nModified": 1, "ok": 1 })
        );
        assert_eq!(
            serde_json::to_value(DeleteResult::none()).unwrap(),
            json!({ "deletedCount": 0, "ok": 0, "n": 0 })
        );
    }
}
