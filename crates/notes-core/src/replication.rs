//! Replicator: cross-tab propagation of note edits and deletes.
//!
//! One instance per process, owned by the composition root and passed to
//! whatever needs it. It tags everything it sends with the process's
//! [`OriginTag`] and drops everything it receives that carries the same tag,
//! since some channel environments deliver a frame back to its sender.
//!
//! Inbound messages are applied straight to the local [`NoteStore`] and never
//! re-broadcast, so a mesh of tabs cannot relay a message forever.
//!
//! If the channel cannot be opened the replicator stays disconnected and all
//! broadcasts become no-ops: the tab keeps working on its own.

use crate::channel::{BroadcastChannel, ChannelBinding};
use crate::document::{Document, DocumentValue};
use crate::note::NoteId;
use crate::origin::OriginTag;
use crate::protocol::CollaborationMessage;
use crate::storage::KeyValueStorage;
use crate::store::{self, NoteStore};
use tracing::{debug, info, warn};

/// Default name of the replication channel.
pub const DEFAULT_CHANNEL: &str = "notes-collaboration";

/// Sends local changes to other tabs and receives theirs.
pub struct Replicator {
    channel_name: String,
    origin: OriginTag,
    binding: Option<Box<dyn ChannelBinding>>,
}

impl Replicator {
    pub fn new(channel_name: impl Into<String>, origin: OriginTag) -> Self {
        Self {
            channel_name: channel_name.into(),
            origin,
            binding: None,
        }
    }

    pub fn origin(&self) -> &OriginTag {
        &self.origin
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn is_connected(&self) -> bool {
        self.binding.is_some()
    }

    /// Bind to the channel. Does nothing if already connected.
    ///
    /// Returns whether the replicator is connected afterwards.
    pub async fn connect(&mut self, channel: &dyn BroadcastChannel) -> bool {
        if self.binding.is_some() {
            return true;
        }
        match channel.open(&self.channel_name).await {
            Ok(binding) => {
                info!(
                    "Joined channel {} as {}",
                    self.channel_name, self.origin
                );
                self.binding = Some(binding);
                true
            }
            Err(e) => {
                warn!("Replication disabled, running single-tab: {}", e);
                false
            }
        }
    }

    /// Release the channel binding. The origin tag is kept for reconnects.
    pub async fn disconnect(&mut self) {
        if let Some(mut binding) = self.binding.take() {
            binding.close().await;
            info!("Left channel {}", self.channel_name);
        }
    }

    /// Tell other tabs a note's content changed.
    pub async fn broadcast_update<D: Document>(&self, note_id: &NoteId, content: &D, updated_at: u64) {
        let msg = CollaborationMessage::update(
            self.origin.clone(),
            note_id.clone(),
            content.clone(),
            updated_at,
        );
        self.send(&msg).await;
    }

    /// Tell other tabs a note was deleted.
    pub async fn broadcast_delete(&self, note_id: &NoteId) {
        let msg = CollaborationMessage::<DocumentValue>::delete(
            self.origin.clone(),
            note_id.clone(),
        );
        self.send(&msg).await;
    }

    async fn send<D: Document>(&self, msg: &CollaborationMessage<D>) {
        let Some(binding) = &self.binding else {
            return;
        };
        let data = match msg.to_json() {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to encode {} for {}: {}", msg.kind(), msg.note_id(), e);
                return;
            }
        };
        match binding.post(&data).await {
            Ok(()) => debug!("Sent {} for {} ({} bytes)", msg.kind(), msg.note_id(), data.len()),
            Err(e) => warn!("Failed to broadcast {} for {}: {}", msg.kind(), msg.note_id(), e),
        }
    }

    /// Decode a frame, dropping malformed frames and our own echoes.
    pub fn accept<D: Document>(&self, data: &[u8]) -> Option<CollaborationMessage<D>> {
        let msg = match CollaborationMessage::from_json(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping inbound frame: {}", e);
                return None;
            }
        };
        if msg.origin_tag() == &self.origin {
            debug!("Dropping own {} for {}", msg.kind(), msg.note_id());
            return None;
        }
        Some(msg)
    }

    /// Wait for the next message from another tab.
    ///
    /// Returns `None` when disconnected or when the channel closes; in the
    /// latter case the replicator becomes disconnected.
    pub async fn recv<D: Document>(&mut self) -> Option<CollaborationMessage<D>> {
        loop {
            let binding = self.binding.as_mut()?;
            let Some(data) = binding.recv().await else {
                warn!("Channel {} closed", self.channel_name);
                self.binding = None;
                return None;
            };
            if let Some(msg) = self.accept(&data) {
                return Some(msg);
            }
        }
    }
}

impl<S: KeyValueStorage, D: Document> NoteStore<S, D> {
    /// Apply a message received from another tab.
    ///
    /// Returns whether local state changed.
    pub async fn apply_remote(&mut self, msg: CollaborationMessage<D>) -> store::Result<bool> {
        debug!(
            "Applying remote {} for {} from {}",
            msg.kind(),
            msg.note_id(),
            msg.origin_tag()
        );
        match msg {
            CollaborationMessage::UpdateNote {
                note_id,
                content,
                updated_at,
                ..
            } => self.apply_remote_update(&note_id, content, updated_at).await,
            CollaborationMessage::DeleteNote { note_id, .. } => {
                self.remove_note_remote(&note_id).await
            }
        }
    }
}
