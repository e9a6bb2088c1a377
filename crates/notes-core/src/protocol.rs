//! Wire format of replication messages.
//!
//! Messages are JSON objects with a `type` discriminator:
//!
//! ```text
//! {"type":"UPDATE_NOTE","originTag":"...","noteId":"...","content":{...},"updatedAt":1700000000000}
//! {"type":"DELETE_NOTE","originTag":"...","noteId":"..."}
//! ```
//!
//! `clientId` is accepted as an alias of `originTag` on input.

use crate::document::{Document, DocumentValue};
use crate::note::NoteId;
use crate::origin::OriginTag;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest frame a channel adapter should accept (50MB).
pub const MAX_MESSAGE_SIZE: usize = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Message too large: {0} bytes")]
    TooLarge(usize),
}

/// A replication message exchanged between tabs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    bound(deserialize = "D: Document")
)]
pub enum CollaborationMessage<D = DocumentValue> {
    /// A note's content was edited in the sending tab.
    #[serde(rename_all = "camelCase")]
    UpdateNote {
        #[serde(alias = "clientId")]
        origin_tag: OriginTag,
        note_id: NoteId,
        content: D,
        updated_at: u64,
    },
    /// A note was deleted in the sending tab.
    #[serde(rename_all = "camelCase")]
    DeleteNote {
        #[serde(alias = "clientId")]
        origin_tag: OriginTag,
        note_id: NoteId,
    },
}

impl<D: Document> CollaborationMessage<D> {
    pub fn update(origin_tag: OriginTag, note_id: NoteId, content: D, updated_at: u64) -> Self {
        Self::UpdateNote {
            origin_tag,
            note_id,
            content,
            updated_at,
        }
    }

    pub fn delete(origin_tag: OriginTag, note_id: NoteId) -> Self {
        Self::DeleteNote {
            origin_tag,
            note_id,
        }
    }

    pub fn origin_tag(&self) -> &OriginTag {
        match self {
            Self::UpdateNote { origin_tag, .. } | Self::DeleteNote { origin_tag, .. } => origin_tag,
        }
    }

    pub fn note_id(&self) -> &NoteId {
        match self {
            Self::UpdateNote { note_id, .. } | Self::DeleteNote { note_id, .. } => note_id,
        }
    }

    /// Wire name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateNote { .. } => "UPDATE_NOTE",
            Self::DeleteNote { .. } => "DELETE_NOTE",
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse from JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge(data.len()));
        }
        Ok(serde_json::from_slice(data)?)
    }
}
