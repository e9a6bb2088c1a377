//! Note and version data model.

use crate::document::{Document, DocumentValue};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

/// Identifier of a note. Generated client-side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NoteId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a saved version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VersionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for VersionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Immutable snapshot of a note's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "D: Document"))]
pub struct Version<D = DocumentValue> {
    pub id: VersionId,
    pub content: D,
    /// Creation time, ms since Unix epoch.
    pub timestamp: u64,
}

/// A single note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "D: Document"))]
pub struct Note<D = DocumentValue> {
    pub id: NoteId,
    pub title: String,
    pub content: D,
    /// Last title/content change (local or remote), ms since Unix epoch.
    pub updated_at: u64,
    /// Saved versions, newest first.
    #[serde(default)]
    pub versions: Vec<Version<D>>,
}

impl<D: Document> Note<D> {
    /// Create an untitled note with empty content and no history.
    pub fn new(now_ms: u64) -> Self {
        Self {
            id: NoteId::generate(),
            title: String::new(),
            content: D::empty(),
            updated_at: now_ms,
            versions: Vec::new(),
        }
    }

    /// Title for list views; blank titles read as "Untitled Note".
    pub fn display_title(&self) -> &str {
        let title = self.title.trim();
        if title.is_empty() { "Untitled Note" } else { title }
    }

    /// Most recently saved version, if any.
    pub fn latest_version(&self) -> Option<&Version<D>> {
        self.versions.first()
    }

    pub fn version(&self, version_id: &VersionId) -> Option<&Version<D>> {
        self.versions.iter().find(|v| &v.id == version_id)
    }
}

/// Fields accepted by a local note update. `None` leaves the field alone.
#[derive(Debug, Clone, PartialEq)]
pub struct NotePatch<D = DocumentValue> {
    pub title: Option<String>,
    pub content: Option<D>,
}

impl<D> NotePatch<D> {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: None,
        }
    }

    pub fn content(content: D) -> Self {
        Self {
            title: None,
            content: Some(content),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

/// Everything the store persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "D: Document"))]
pub struct StoreState<D = DocumentValue> {
    /// Display order, newest-created first.
    pub notes: Vec<Note<D>>,
    pub active_note_id: Option<NoteId>,
}

impl<D> Default for StoreState<D> {
    fn default() -> Self {
        Self {
            notes: Vec::new(),
            active_note_id: None,
        }
    }
}

impl<D> StoreState<D> {
    pub fn note(&self, id: &NoteId) -> Option<&Note<D>> {
        self.notes.iter().find(|n| &n.id == id)
    }

    pub fn note_mut(&mut self, id: &NoteId) -> Option<&mut Note<D>> {
        self.notes.iter_mut().find(|n| &n.id == id)
    }

    /// Remove a note, clearing the selection if it pointed at it.
    ///
    /// Returns false if the note was not present.
    pub fn remove(&mut self, id: &NoteId) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| &n.id != id);
        if self.notes.len() == before {
            return false;
        }
        if self.active_note_id.as_ref() == Some(id) {
            self.active_note_id = None;
        }
        true
    }
}

/// Current wall-clock time in milliseconds since Unix epoch.
pub fn now_ms() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
