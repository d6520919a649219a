//! Predicate evaluation against stored documents.
//!
//! Matching is flat field equality. Values must have the same JSON type to be equal;
//! numbers compare by numeric value (`1` equals `1.0`), arrays and objects compare
//! structurally. A predicate naming `_id` is resolved by direct key lookup instead of a
//! scan.
//!
//! The empty predicate matches nothing here. Operations that treat it as "match all"
//! special-case it before calling into this module.

use serde_json::{Number, Value};

use crate::{
    backend::CollectionMap,
    document::Fields,
    identity::ID_FIELD,
    query::Filter,
};

/// Returns `true` when every field of `filter` is present in `document` with an equal value.
///
/// Stops at the first mismatching field. Neither input is modified.
pub fn matches(document: &Fields, filter: &Filter) -> bool {
    !filter.is_empty()
        && filter
            .fields()
            .iter()
            .all(|(field, expected)| {
                document
                    .get(field)
                    .is_some_and(|actual| strict_eq(actual, expected))
            })
}

/// Equality without cross-type coercion.
pub fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => numbers_eq(a, b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| strict_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| strict_eq(x, y)))
        }
        _ => false,
    }
}

fn numbers_eq(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }

    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Selects the documents of `documents` matched by a non-empty `filter`, in map order.
///
/// With `first_only` the scan stops at the first match. Stored identities are strings,
/// so an `_id` of any other type selects nothing.
pub fn select<'a>(
    documents: &'a CollectionMap,
    filter: &Filter,
    first_only: bool,
) -> Vec<(&'a String, &'a Fields)> {
    if filter.is_empty() {
        return Vec::new();
    }

    if let Some(id) = filter.fields().get(ID_FIELD) {
        let Value::String(id) = id else {
            return Vec::new();
        };

        // The remaining fields still have to agree with the stored document.
        return documents
            .get_key_value(id.as_str())
            .filter(|(_, fields)| {
                filter
                    .fields()
                    .iter()
                    .filter(|(field, _)| field.as_str() != ID_FIELD)
                    .all(|(field, expected)| {
                        fields
                            .get(field)
                            .is_some_and(|actual| strict_eq(actual, expected))
                    })
            })
            .into_iter()
            .collect();
    }

    let matched = documents
        .iter()
        .filter(|(_, fields)| matches(fields, filter));

    if first_only {
        matched.take(1).collect()
    } else {
        matched.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn collection() -> CollectionMap {
        [
            ("1", json!({ "_id": "1", "email": "a@x.com", "name": "A" })),
            ("2", json!({ "_id": "2", "email": "a@x.com", "name": "C" })),
            ("3", json!({ "_id": "3", "email": "b@x.com", "name": "A" })),
        ]
        .into_iter()
        .map(|(id, value)| (id.to_string(), doc(value)))
        .collect()
    }

    #[test]
    fn every_field_must_match() {
        let document = doc(json!({ "email": "a@x.com", "name": "A", "age": 3 }));

        assert!(matches(&document, &Filter::eq("email", "a@x.com")));
        assert!(matches(&document, &Filter::eq("email", "a@x.com").and_eq("age", 3)));
        assert!(!matches(&document, &Filter::eq("email", "a@x.com").and_eq("name", "B")));
        assert!(!matches(&document, &Filter::eq("missing", Value::Null)));
    }

    #[test]
    fn empty_filter_matches_nothing() {
        assert!(!matches(&doc(json!({ "a": 1 })), &Filter::all()));
        assert!(select(&collection(), &Filter::all(), false).is_empty());
    }

    #[test]
    fn equality_does_not_coerce() {
        assert!(!strict_eq(&json!(1), &json!("1")));
        assert!(!strict_eq(&json!(0), &json!(false)));
        assert!(!strict_eq(&json!(null), &json!(false)));
        assert!(strict_eq(&json!(1), &json!(1.0)));
        assert!(strict_eq(&json!([1, { "a": "b" }]), &json!([1, { "a": "b" }])));
        assert!(!strict_eq(&json!([1, 2]), &json!([2, 1])));
        assert!(!strict_eq(&json!({ "a": 1 }), &json!({ "a": 1, "b": 2 })));
    }

    #[test]
    fn large_integers_compare_exactly() {
        assert!(!strict_eq(&json!(9007199254740993_u64), &json!(9007199254740992_u64)));
        assert!(strict_eq(&json!(u64::MAX), &json!(u64::MAX)));
    }

    #[test]
    fn select_scans_in_map_order() {
        let documents = collection();
        let ids = select(&documents, &Filter::eq("email", "a@x.com"), false)
            .into_iter()
            .map(|(id, _)| id.as_str())
            .collect::<Vec<_>>();

        assert_eq!(ids, ["1", "2"]);

        let first = select(&documents, &Filter::eq("name", "A"), true);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0, "1");
    }

    #[test]
    fn select_by_identity_uses_lookup() {
        let documents = collection();

        assert_eq!(select(&documents, &Filter::by_id("3"), false)[0].0, "3");
        assert!(select(&documents, &Filter::by_id("9"), false).is_empty());
        assert!(select(&documents, &Filter::by_id("3").and_eq("name", "C"), false).is_empty());
    }

    #[test]
    fn non_string_identity_selects_nothing() {
        let documents = collection();

        assert!(select(&documents, &Filter::eq("_id", 1), false).is_empty());
        assert!(select(&documents, &Filter::eq("_id", 1).and_eq("name", "A"), true).is_empty());
    }
}
