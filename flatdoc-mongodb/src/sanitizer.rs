//! Field name escaping for MongoDB compatibility.
//!
//! MongoDB rejects or misinterprets document keys containing dots, dollar signs or null
//! bytes, all of which are legal in stored JSON fields. Keys are escaped on the way in and
//! restored on the way out; values are stored untouched.

use bson::Bson;

/// Escapes and restores document keys and collection names.
pub(crate) struct KeySanitizer;

impl KeySanitizer {
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Recursively escapes the keys of every nested document, including documents
    /// inside arrays.
    pub(crate) fn sanitize_value(value: Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(
                arr
                    .into_iter()
                    .map(Self::sanitize_value)
                    .collect(),
            ),
            Bson::Document(doc) => Bson::Document(
                doc.into_iter()
                    .map(|(k, v)| (Self::sanitize(&k), Self::sanitize_value(v)))
                    .collect(),
            ),
            other => other,
        }
    }

    pub(crate) fn sanitize(input: &str) -> String {
        let mut sanitized = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(*target, *replacement);
        }
        sanitized
    }

    /// Inverse of [`sanitize_value`](Self::sanitize_value).
    pub(crate) fn restore_value(value: Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(
                arr
                    .into_iter()
                    .map(Self::restore_value)
                    .collect(),
            ),
            Bson::Document(doc) => Bson::Document(
                doc.into_iter()
                    .map(|(k, v)| (Self::restore(&k), Self::restore_value(v)))
                    .collect(),
            ),
            other => other,
        }
    }

    pub(crate) fn restore(input: &str) -> String {
        let mut restored = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(*replacement, *target);
        }
        restored
    }
}
