//! Opaque document values produced by the editing surface.
//!
//! The core never looks inside a document. It only needs to clone it,
//! serialize it, and compare two documents structurally (for duplicate
//! version detection).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt::Debug;

/// Content stored in a note or a version.
///
/// Implementations must be JSON-serializable and support structural
/// equality. `empty()` is the content given to freshly created notes.
pub trait Document:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Minimal empty document for new notes.
    fn empty() -> Self;
}

/// Rich-text document as an untyped JSON tree.
///
/// Equality is structural: object keys compare as sets, so two documents
/// that differ only in key order are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentValue(Value);

impl DocumentValue {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the underlying JSON tree.
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn into_json(self) -> Value {
        self.0
    }
}

impl Document for DocumentValue {
    fn empty() -> Self {
        Self(json!({
            "type": "doc",
            "content": [{ "type": "paragraph" }]
        }))
    }
}

impl Default for DocumentValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for DocumentValue {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
