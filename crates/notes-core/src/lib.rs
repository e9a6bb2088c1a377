//! notes-core: local-first note store with cross-tab replication.
//!
//! This crate provides the core functionality for:
//! - The authoritative note collection of one tab, persisted on every change
//! - Manual version snapshots with restore and clear
//! - Last-writer-wins replication of edits and deletes between tabs
//! - Storage and broadcast channel trait abstractions

pub mod channel;
pub mod document;
pub mod events;
pub mod note;
pub mod origin;
pub mod persistence;
pub mod protocol;
pub mod replication;
pub mod storage;
pub mod store;
pub mod versions;

pub use channel::{BroadcastChannel, ChannelBinding, ChannelError, LocalBroadcast, Unavailable};
pub use document::{Document, DocumentValue};
pub use events::{ChangeOrigin, EventBus, StoreEvent, Subscription};
pub use note::{Note, NoteId, NotePatch, StoreState, Version, VersionId};
pub use origin::{OriginTag, OriginTagError};
pub use protocol::CollaborationMessage;
pub use replication::{DEFAULT_CHANNEL, Replicator};
pub use storage::{InMemoryStorage, KeyValueStorage, StorageError};
pub use store::{NoteStore, StoreError};
