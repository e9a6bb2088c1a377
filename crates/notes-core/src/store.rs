//! NoteStore: the authoritative note collection of one tab.
//!
//! Every mutation is applied in memory, then committed: the full state is
//! serialized and written to storage as one record. Mutations that reference
//! an unknown note (or version) are no-ops, not errors, because another tab
//! may have deleted it a moment ago. Those no-ops neither commit nor emit.
//!
//! A failed commit is reported to the caller but the in-memory change is
//! kept, so editing keeps working on a broken disk.

use crate::document::{Document, DocumentValue};
use crate::events::{ChangeOrigin, EventBus, StoreEvent};
use crate::note::{Note, NoteId, NotePatch, StoreState, now_ms};
use crate::persistence::{self, PersistError, STORAGE_KEY};
use crate::storage::{KeyValueStorage, StorageError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Note collection backed by durable storage.
pub struct NoteStore<S, D = DocumentValue> {
    pub(crate) state: StoreState<D>,
    storage: S,
    events: Arc<EventBus>,
}

impl<S: KeyValueStorage, D: Document> NoteStore<S, D> {
    /// Open a store, hydrating from storage.
    ///
    /// Missing, corrupt, or version-mismatched records all yield an empty
    /// store. Opening never fails.
    pub async fn open(storage: S) -> Self {
        let state = Self::hydrate(&storage).await;
        Self {
            state,
            storage,
            events: Arc::new(EventBus::new()),
        }
    }

    async fn hydrate(storage: &S) -> StoreState<D> {
        match Self::load(storage).await {
            Ok(Some(state)) => {
                info!("Hydrated {} note(s) from storage", state.notes.len());
                state
            }
            Ok(None) => {
                debug!("No persisted state, starting empty");
                StoreState::default()
            }
            Err(e) => {
                warn!("Discarding persisted state, starting empty: {}", e);
                StoreState::default()
            }
        }
    }

    /// Read and decode the persisted record. `None` if nothing is stored.
    async fn load(storage: &S) -> Result<Option<StoreState<D>>> {
        let Some(data) = storage.get(STORAGE_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(persistence::decode(&data)?))
    }

    /// Write the full state to storage.
    pub(crate) async fn commit(&self) -> Result<()> {
        let data = persistence::encode(&self.state)?;
        self.storage.set(STORAGE_KEY, &data).await?;
        debug!("Committed {} note(s) ({} bytes)", self.state.notes.len(), data.len());
        Ok(())
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        self.events.emit(event);
    }

    /// Event bus for change notifications.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Current state, read-only.
    pub fn state(&self) -> &StoreState<D> {
        &self.state
    }

    /// Notes in display order, newest-created first.
    pub fn notes(&self) -> &[Note<D>] {
        &self.state.notes
    }

    pub fn note(&self, id: &NoteId) -> Option<&Note<D>> {
        self.state.note(id)
    }

    pub fn active_note_id(&self) -> Option<&NoteId> {
        self.state.active_note_id.as_ref()
    }

    /// The selected note, or `None` if nothing (or a missing id) is selected.
    pub fn get_active_note(&self) -> Option<&Note<D>> {
        self.state
            .active_note_id
            .as_ref()
            .and_then(|id| self.state.note(id))
    }

    /// Create an empty note at the front of the list and select it.
    pub async fn create_note(&mut self) -> Result<NoteId> {
        let note = Note::new(now_ms());
        let id = note.id.clone();
        self.state.notes.insert(0, note);
        self.state.active_note_id = Some(id.clone());
        debug!("Created note {}", id);

        self.emit(StoreEvent::NoteCreated { note_id: id.clone() });
        self.emit(StoreEvent::ActiveNoteChanged {
            note_id: Some(id.clone()),
        });
        self.commit().await?;
        Ok(id)
    }

    /// Merge `patch` into a note and bump its `updated_at`.
    ///
    /// Versions are never touched. Returns false if the note does not exist
    /// or the patch is empty.
    pub async fn update_note(&mut self, id: &NoteId, patch: NotePatch<D>) -> Result<bool> {
        if patch.is_empty() {
            return Ok(false);
        }
        let Some(note) = self.state.note_mut(id) else {
            debug!("Ignoring update for unknown note {}", id);
            return Ok(false);
        };

        if let Some(title) = patch.title {
            note.title = title;
        }
        if let Some(content) = patch.content {
            note.content = content;
        }
        note.updated_at = now_ms();

        self.emit(StoreEvent::NoteUpdated {
            note_id: id.clone(),
            origin: ChangeOrigin::Local,
        });
        self.commit().await?;
        Ok(true)
    }

    /// Delete a note, clearing the selection if it was selected.
    pub async fn delete_note(&mut self, id: &NoteId) -> Result<bool> {
        self.remove(id, ChangeOrigin::Local).await
    }

    /// Select a note, or clear the selection.
    ///
    /// The id is not validated; selecting a missing note simply shows nothing.
    pub async fn set_active_note(&mut self, id: Option<NoteId>) -> Result<()> {
        if self.state.active_note_id == id {
            return Ok(());
        }
        self.state.active_note_id = id.clone();
        self.emit(StoreEvent::ActiveNoteChanged { note_id: id });
        self.commit().await
    }

    /// Overwrite a note's content with a remote edit.
    ///
    /// Last writer wins unconditionally: `updated_at` is taken as given even
    /// when it is older than the local one. Unknown notes are ignored; they
    /// show up after the next `reload`.
    pub async fn apply_remote_update(
        &mut self,
        id: &NoteId,
        content: D,
        updated_at: u64,
    ) -> Result<bool> {
        let Some(note) = self.state.note_mut(id) else {
            debug!("Ignoring remote update for unknown note {}", id);
            return Ok(false);
        };
        note.content = content;
        note.updated_at = updated_at;

        self.emit(StoreEvent::NoteUpdated {
            note_id: id.clone(),
            origin: ChangeOrigin::Remote,
        });
        self.commit().await?;
        Ok(true)
    }

    /// Delete a note because another tab deleted it. Never re-broadcast.
    pub async fn remove_note_remote(&mut self, id: &NoteId) -> Result<bool> {
        self.remove(id, ChangeOrigin::Remote).await
    }

    async fn remove(&mut self, id: &NoteId, origin: ChangeOrigin) -> Result<bool> {
        let was_active = self.state.active_note_id.as_ref() == Some(id);
        if !self.state.remove(id) {
            debug!("Ignoring delete for unknown note {}", id);
            return Ok(false);
        }
        debug!("Deleted note {} ({:?})", id, origin);

        self.emit(StoreEvent::NoteDeleted {
            note_id: id.clone(),
            origin,
        });
        if was_active {
            self.emit(StoreEvent::ActiveNoteChanged { note_id: None });
        }
        self.commit().await?;
        Ok(true)
    }

    /// Drop every note and the selection. Irreversible.
    pub async fn clear_all_data(&mut self) -> Result<()> {
        self.state = StoreState::default();
        info!("Cleared all notes");
        self.emit(StoreEvent::DataCleared);
        self.commit().await
    }

    /// Re-read state from storage, replacing what is in memory.
    ///
    /// Picks up notes other tabs have persisted since this store was opened.
    /// The in-memory state is only replaced by a record that decodes: on a
    /// read or decode error it is kept and the error returned, and with no
    /// record at all it is kept and `false` returned.
    pub async fn reload(&mut self) -> Result<bool> {
        match Self::load(&self.storage).await {
            Ok(Some(state)) => {
                info!("Reloaded {} note(s) from storage", state.notes.len());
                self.state = state;
                self.emit(StoreEvent::Reloaded);
                Ok(true)
            }
            Ok(None) => {
                debug!("Nothing persisted, keeping in-memory state");
                Ok(false)
            }
            Err(e) => {
                warn!("Reload failed, keeping in-memory state: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SCHEMA_VERSION;
    use crate::storage::InMemoryStorage;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    type TestStore = NoteStore<Arc<InMemoryStorage>>;

    async fn empty_store() -> (TestStore, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        (NoteStore::open(Arc::clone(&storage)).await, storage)
    }

    fn doc(text: &str) -> DocumentValue {
        json!({"type": "doc", "content": [{"type": "paragraph", "content": [{"type": "text", "text": text}]}]}).into()
    }

    #[tokio::test]
    async fn test_create_note_inserts_at_front_and_selects() {
        let (mut store, _) = empty_store().await;

        let first = store.create_note().await.unwrap();
        let second = store.create_note().await.unwrap();

        assert_eq!(store.notes().len(), 2);
        assert_eq!(store.notes()[0].id, second);
        assert_eq!(store.notes()[1].id, first);
        assert_eq!(store.active_note_id(), Some(&second));

        let note = store.get_active_note().unwrap();
        assert!(note.title.is_empty());
        assert_eq!(note.content, DocumentValue::empty());
        assert!(note.versions.is_empty());
    }

    #[tokio::test]
    async fn test_update_note_merges_fields() {
        let (mut store, _) = empty_store().await;
        let id = store.create_note().await.unwrap();
        let created_at = store.note(&id).unwrap().updated_at;

        assert!(store.update_note(&id, NotePatch::title("Plans")).await.unwrap());
        assert!(store.update_note(&id, NotePatch::content(doc("hi"))).await.unwrap());

        let note = store.note(&id).unwrap();
        assert_eq!(note.title, "Plans");
        assert_eq!(note.content, doc("hi"));
        assert!(note.updated_at >= created_at);
        assert!(note.versions.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_note_is_noop() {
        let (mut store, storage) = empty_store().await;
        store.create_note().await.unwrap();
        let before = store.state().clone();
        let writes = storage.write_count();

        let changed = store
            .update_note(&NoteId::from("missing"), NotePatch::title("x"))
            .await
            .unwrap();

        assert!(!changed);
        assert_eq!(store.state(), &before);
        assert_eq!(storage.write_count(), writes);
    }

    #[tokio::test]
    async fn test_empty_patch_is_noop() {
        let (mut store, _) = empty_store().await;
        let id = store.create_note().await.unwrap();
        let before = store.state().clone();

        let patch = NotePatch {
            title: None,
            content: None,
        };
        assert!(!store.update_note(&id, patch).await.unwrap());
        assert_eq!(store.state(), &before);
    }

    #[tokio::test]
    async fn test_delete_clears_active() {
        let (mut store, _) = empty_store().await;
        let a = store.create_note().await.unwrap();
        let b = store.create_note().await.unwrap();

        // b is active; deleting a keeps the selection
        assert!(store.delete_note(&a).await.unwrap());
        assert_eq!(store.active_note_id(), Some(&b));

        assert!(store.delete_note(&b).await.unwrap());
        assert!(store.active_note_id().is_none());
        assert!(store.notes().is_empty());

        assert!(!store.delete_note(&b).await.unwrap());
    }

    #[tokio::test]
    async fn test_active_id_always_valid_or_none() {
        let (mut store, _) = empty_store().await;
        let mut ids = Vec::new();

        let check = |store: &TestStore| {
            if let Some(id) = store.active_note_id() {
                assert!(store.note(id).is_some(), "active id {} dangles", id);
            }
        };

        for step in 0..12 {
            match step % 4 {
                0 | 1 => ids.push(store.create_note().await.unwrap()),
                2 => {
                    let id = ids.remove(0);
                    store.delete_note(&id).await.unwrap();
                }
                _ => {
                    let id = ids.pop().unwrap();
                    store.remove_note_remote(&id).await.unwrap();
                }
            }
            check(&store);
        }
    }

    #[tokio::test]
    async fn test_set_active_note_does_not_validate() {
        let (mut store, _) = empty_store().await;
        store.create_note().await.unwrap();

        store
            .set_active_note(Some(NoteId::from("nowhere")))
            .await
            .unwrap();
        assert_eq!(store.active_note_id(), Some(&NoteId::from("nowhere")));
        assert!(store.get_active_note().is_none());

        store.set_active_note(None).await.unwrap();
        assert!(store.get_active_note().is_none());
    }

    #[tokio::test]
    async fn test_remote_update_wins_even_if_older() {
        let (mut store, _) = empty_store().await;
        let id = store.create_note().await.unwrap();
        store
            .update_note(&id, NotePatch::content(doc("local")))
            .await
            .unwrap();
        assert!(store.note(&id).unwrap().updated_at > 1000);

        assert!(store.apply_remote_update(&id, doc("remote"), 1000).await.unwrap());

        let note = store.note(&id).unwrap();
        assert_eq!(note.content, doc("remote"));
        assert_eq!(note.updated_at, 1000);
    }

    #[tokio::test]
    async fn test_remote_update_unknown_note_is_noop() {
        let (mut store, storage) = empty_store().await;
        store.create_note().await.unwrap();
        let before = store.state().clone();
        let writes = storage.write_count();

        let changed = store
            .apply_remote_update(&NoteId::from("elsewhere"), doc("x"), 5)
            .await
            .unwrap();

        assert!(!changed);
        assert_eq!(store.state(), &before);
        assert_eq!(storage.write_count(), writes);
    }

    #[tokio::test]
    async fn test_every_mutation_commits() {
        let (mut store, storage) = empty_store().await;

        let id = store.create_note().await.unwrap();
        store.update_note(&id, NotePatch::title("t")).await.unwrap();
        store.set_active_note(None).await.unwrap();
        store.delete_note(&id).await.unwrap();

        assert_eq!(storage.write_count(), 4);

        let data = storage.get(STORAGE_KEY).await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(json["version"], SCHEMA_VERSION);
        assert_eq!(json["state"]["notes"], json!([]));
    }

    #[tokio::test]
    async fn test_hydrates_from_storage() {
        let storage = Arc::new(InMemoryStorage::new());
        let id = {
            let mut store: TestStore = NoteStore::open(Arc::clone(&storage)).await;
            let id = store.create_note().await.unwrap();
            store.update_note(&id, NotePatch::title("Kept")).await.unwrap();
            id
        };

        let store: TestStore = NoteStore::open(Arc::clone(&storage)).await;
        assert_eq!(store.notes().len(), 1);
        assert_eq!(store.note(&id).unwrap().title, "Kept");
        assert_eq!(store.active_note_id(), Some(&id));
    }

    #[tokio::test]
    async fn test_schema_mismatch_starts_empty() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.insert_raw(
            STORAGE_KEY,
            br#"{"version":99,"state":{"notes":[{"id":"x"}],"activeNoteId":"x"}}"#,
        );

        let mut store: TestStore = NoteStore::open(Arc::clone(&storage)).await;
        assert!(store.notes().is_empty());
        assert!(store.active_note_id().is_none());

        // First commit replaces the stale record
        store.create_note().await.unwrap();
        let data = storage.get(STORAGE_KEY).await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(json["version"], 1);
    }

    #[tokio::test]
    async fn test_corrupt_storage_starts_empty() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.insert_raw(STORAGE_KEY, b"{{{ definitely not json");

        let store: TestStore = NoteStore::open(storage).await;
        assert!(store.notes().is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_data() {
        let (mut store, _) = empty_store().await;
        store.create_note().await.unwrap();
        store.create_note().await.unwrap();

        store.clear_all_data().await.unwrap();

        assert!(store.notes().is_empty());
        assert!(store.active_note_id().is_none());
    }

    #[tokio::test]
    async fn test_reload_picks_up_other_tab() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut tab_a: TestStore = NoteStore::open(Arc::clone(&storage)).await;
        let mut tab_b: TestStore = NoteStore::open(Arc::clone(&storage)).await;

        let id = tab_a.create_note().await.unwrap();
        assert!(tab_b.note(&id).is_none());

        assert!(tab_b.reload().await.unwrap());
        assert!(tab_b.note(&id).is_some());
    }

    /// Storage whose reads can be switched to fail.
    struct FlakyStorage {
        inner: InMemoryStorage,
        fail_reads: AtomicBool,
    }

    #[async_trait::async_trait]
    impl KeyValueStorage for FlakyStorage {
        async fn get(&self, key: &str) -> crate::storage::Result<Option<Vec<u8>>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError::Io("read failed".into()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8]) -> crate::storage::Result<()> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> crate::storage::Result<()> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_notes() {
        let storage = Arc::new(FlakyStorage {
            inner: InMemoryStorage::new(),
            fail_reads: Default::default(),
        });
        let mut store: NoteStore<Arc<FlakyStorage>> =
            NoteStore::open(Arc::clone(&storage)).await;
        for _ in 0..3 {
            store.create_note().await.unwrap();
        }

        storage.fail_reads.store(true, Ordering::SeqCst);
        assert!(matches!(store.reload().await, Err(StoreError::Storage(_))));
        assert_eq!(store.notes().len(), 3);

        // The next commit writes everything, not an empty state
        store.create_note().await.unwrap();
        let data = storage.inner.get(STORAGE_KEY).await.unwrap().unwrap();
        let persisted: StoreState = persistence::decode(&data).unwrap();
        assert_eq!(persisted.notes.len(), 4);
    }

    #[tokio::test]
    async fn test_reload_keeps_state_on_corrupt_or_missing_record() {
        let (mut store, storage) = empty_store().await;
        let id = store.create_note().await.unwrap();

        storage.insert_raw(STORAGE_KEY, b"{{{ definitely not json");
        assert!(matches!(store.reload().await, Err(StoreError::Persist(_))));
        assert!(store.note(&id).is_some());

        storage.remove(STORAGE_KEY).await.unwrap();
        assert!(!store.reload().await.unwrap());
        assert!(store.note(&id).is_some());
    }

    #[tokio::test]
    async fn test_events_report_origin() {
        let (mut store, _) = empty_store().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = store.events().subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.clone());
        });

        let id = store.create_note().await.unwrap();
        store.update_note(&id, NotePatch::title("a")).await.unwrap();
        store.apply_remote_update(&id, doc("b"), 1).await.unwrap();
        store.remove_note_remote(&id).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                StoreEvent::NoteCreated { note_id: id.clone() },
                StoreEvent::ActiveNoteChanged {
                    note_id: Some(id.clone())
                },
                StoreEvent::NoteUpdated {
                    note_id: id.clone(),
                    origin: ChangeOrigin::Local
                },
                StoreEvent::NoteUpdated {
                    note_id: id.clone(),
                    origin: ChangeOrigin::Remote
                },
                StoreEvent::NoteDeleted {
                    note_id: id.clone(),
                    origin: ChangeOrigin::Remote
                },
                StoreEvent::ActiveNoteChanged { note_id: None },
            ]
        );
    }
}
