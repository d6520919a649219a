//! Document identities and the generators that mint them.
//!
//! An [`Identity`] is an opaque string to every component except the collection engine,
//! which is the only place new identities are minted. Two generators are provided:
//!
//! - [`ObjectIdGenerator`] - 24 hex characters, time-ordered (the default)
//! - [`UuidGenerator`] - random v4 UUIDs

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use uuid::Uuid;

/// Name of the identity field inside every stored document.
pub const ID_FIELD: &str = "_id";

/// Unique, immutable key of a document within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Creation time embedded in ObjectId-shaped identities.
    ///
    /// Returns `None` for identities that were not produced by [`ObjectIdGenerator`]
    /// (or that were supplied by a caller in some other format).
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        ObjectId::parse_str(&self.0)
            .ok()
            .map(|oid| oid.timestamp().to_chrono())
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&Identity> for Identity {
    fn from(value: &Identity) -> Self {
        value.clone()
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of fresh identities for newly created documents.
pub trait IdGenerator: Send + Sync + Debug {
    fn next_id(&self) -> Identity;
}

/// Generates BSON ObjectIds rendered as lowercase hex.
///
/// ObjectIds embed a seconds-resolution timestamp followed by a process-unique
/// random value and a counter, so identities sort roughly by creation time.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectIdGenerator;

impl IdGenerator for ObjectIdGenerator {
    fn next_id(&self) -> Identity {
        Identity(ObjectId::new().to_hex())
    }
}

/// Generates random (v4) UUIDs in hyphenated form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> Identity {
        Identity(Uuid::new_v4().to_string())
    }
}
