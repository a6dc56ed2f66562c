//! Document model and the document-store boundary
//!
//! A [`Document`] is the canonical representation of one stored item: a
//! stable unique id, an optional `entity` discriminator partitioning the
//! heterogeneous collection into record kinds, a monotonically increasing
//! revision token, and free-form fields.
//!
//! The engine does not read storage. It is pushed a [`DocChange`] for every
//! committed write, in revision order per document id (ordering across
//! different ids is not required).

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Free-form document fields: field name to value.
pub type Fields = HashMap<String, Value>;

/// Stable, unique document identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(String);

impl DocId {
    /// Create a new document id.
    pub fn new(id: impl Into<String>) -> Self {
        DocId(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        DocId(s.to_string())
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        DocId(s)
    }
}

/// One stored item of the heterogeneous collection.
///
/// `entity` is immutable for the life of a document id (the engine rejects
/// changes that violate this). A document with no entity participates in no
/// per-entity view but may still participate in all-entity views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique, stable identifier.
    pub id: DocId,
    /// Entity type discriminator ("account", "sample", "log", ...).
    pub entity: Option<String>,
    /// Monotonically increasing revision token.
    pub revision: u64,
    /// Field name to value.
    pub fields: Fields,
}

impl Document {
    /// Create an empty document of the given entity type at revision 1.
    pub fn new(id: impl Into<DocId>, entity: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            entity: Some(entity.into()),
            revision: 1,
            fields: Fields::new(),
        }
    }

    /// Create an empty document with no entity discriminator.
    pub fn without_entity(id: impl Into<DocId>) -> Self {
        Document {
            id: id.into(),
            entity: None,
            revision: 1,
            fields: Fields::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder-style revision assignment.
    pub fn at_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Look up a string field by name.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }
}

/// One (key, value) pair produced by running a view's extraction rule
/// against a document.
///
/// Emission order is significant: sequence numbers in the index derive from
/// it, and a document may emit the same key (even the same key and value)
/// multiple times, each retained as a distinct entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    /// The index key (scalar, or array for compound keys).
    pub key: Value,
    /// The carried value (Null when the rule emits no value).
    pub value: Value,
}

impl Emission {
    /// Create an emission.
    pub fn new(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Emission {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Change notification for one committed document write.
///
/// `previous` is None for a newly created document; `new` is None for a
/// deletion. The store delivers changes in revision order per document id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocChange {
    /// The written document's id.
    pub doc_id: DocId,
    /// The document's entity discriminator.
    pub entity: Option<String>,
    /// Revision token of this write.
    pub revision: u64,
    /// Fields before the write (None if newly created).
    pub previous: Option<Fields>,
    /// Fields after the write (None if deleted).
    pub new: Option<Fields>,
}

impl DocChange {
    /// Change for a newly created document.
    pub fn created(doc: &Document) -> Self {
        DocChange {
            doc_id: doc.id.clone(),
            entity: doc.entity.clone(),
            revision: doc.revision,
            previous: None,
            new: Some(doc.fields.clone()),
        }
    }

    /// Change for an update of an existing document.
    pub fn updated(doc: &Document, previous: Fields) -> Self {
        DocChange {
            doc_id: doc.id.clone(),
            entity: doc.entity.clone(),
            revision: doc.revision,
            previous: Some(previous),
            new: Some(doc.fields.clone()),
        }
    }

    /// Change for a deletion.
    pub fn deleted(
        doc_id: impl Into<DocId>,
        entity: Option<String>,
        revision: u64,
        previous: Fields,
    ) -> Self {
        DocChange {
            doc_id: doc_id.into(),
            entity,
            revision,
            previous: Some(previous),
            new: None,
        }
    }

    /// The document body after this write, if any.
    pub fn new_document(&self) -> Option<Document> {
        self.new.as_ref().map(|fields| Document {
            id: self.doc_id.clone(),
            entity: self.entity.clone(),
            revision: self.revision,
            fields: fields.clone(),
        })
    }

    /// Whether this change removes the document.
    pub fn is_delete(&self) -> bool {
        self.new.is_none()
    }
}
