//! Version history operations on [`NoteStore`].
//!
//! Versions are manual snapshots of a note's content, newest first. They are
//! never edited once taken and never removed one by one: only
//! `clear_versions` or deleting the note gets rid of them.

use crate::document::Document;
use crate::events::{ChangeOrigin, StoreEvent};
use crate::note::{NoteId, Version, VersionId, now_ms};
use crate::storage::KeyValueStorage;
use crate::store::{NoteStore, Result};
use tracing::debug;

impl<S: KeyValueStorage, D: Document> NoteStore<S, D> {
    /// Snapshot the note's current content.
    ///
    /// Skipped when the content equals the newest version's content, so
    /// saving twice without editing in between keeps one version. Returns the
    /// new version's id, or `None` if nothing was saved.
    pub async fn save_version(&mut self, note_id: &NoteId) -> Result<Option<VersionId>> {
        let Some(note) = self.state.note_mut(note_id) else {
            debug!("Ignoring save_version for unknown note {}", note_id);
            return Ok(None);
        };

        if note
            .latest_version()
            .is_some_and(|latest| latest.content == note.content)
        {
            debug!("Note {} unchanged since last version", note_id);
            return Ok(None);
        }

        let version = Version {
            id: VersionId::generate(),
            content: note.content.clone(),
            timestamp: now_ms(),
        };
        let version_id = version.id.clone();
        note.versions.insert(0, version);
        debug!("Saved version {} of note {}", version_id, note_id);

        self.emit(StoreEvent::VersionSaved {
            note_id: note_id.clone(),
            version_id: version_id.clone(),
        });
        self.commit().await?;
        Ok(Some(version_id))
    }

    /// Replace the note's content with a saved version's content.
    ///
    /// History is left exactly as it was. Returns false if the note or
    /// version does not exist.
    pub async fn restore_version(
        &mut self,
        note_id: &NoteId,
        version_id: &VersionId,
    ) -> Result<bool> {
        let Some(note) = self.state.note_mut(note_id) else {
            return Ok(false);
        };
        let Some(content) = note.version(version_id).map(|v| v.content.clone()) else {
            debug!("Version {} not found on note {}", version_id, note_id);
            return Ok(false);
        };
        note.content = content;
        note.updated_at = now_ms();

        self.emit(StoreEvent::VersionRestored {
            note_id: note_id.clone(),
            version_id: version_id.clone(),
        });
        self.emit(StoreEvent::NoteUpdated {
            note_id: note_id.clone(),
            origin: ChangeOrigin::Local,
        });
        self.commit().await?;
        Ok(true)
    }

    /// Drop every saved version of one note.
    pub async fn clear_versions(&mut self, note_id: &NoteId) -> Result<bool> {
        let Some(note) = self.state.note_mut(note_id) else {
            return Ok(false);
        };
        if note.versions.is_empty() {
            return Ok(false);
        }
        note.versions.clear();

        self.emit(StoreEvent::VersionsCleared {
            note_id: note_id.clone(),
        });
        self.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::document::{Document, DocumentValue};
    use crate::note::{NoteId, NotePatch, VersionId};
    use crate::storage::InMemoryStorage;
    use crate::store::NoteStore;
    use serde_json::json;

    type TestStore = NoteStore<InMemoryStorage>;

    fn doc(text: &str) -> DocumentValue {
        json!({"type": "doc", "content": [{"type": "paragraph", "content": [{"type": "text", "text": text}]}]}).into()
    }

    async fn store_with_note() -> (TestStore, NoteId) {
        let mut store: TestStore = NoteStore::open(InMemoryStorage::new()).await;
        let id = store.create_note().await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_first_save_always_succeeds() {
        let (mut store, id) = store_with_note().await;

        // Empty content, empty history: saved
        let saved = store.save_version(&id).await.unwrap();
        assert!(saved.is_some());
        assert_eq!(store.note(&id).unwrap().versions.len(), 1);
    }

    #[tokio::test]
    async fn test_save_twice_without_edit_dedups() {
        let (mut store, id) = store_with_note().await;
        store.update_note(&id, NotePatch::content(doc("a"))).await.unwrap();

        assert!(store.save_version(&id).await.unwrap().is_some());
        assert!(store.save_version(&id).await.unwrap().is_none());

        assert_eq!(store.note(&id).unwrap().versions.len(), 1);
    }

    #[tokio::test]
    async fn test_versions_newest_first() {
        let (mut store, id) = store_with_note().await;

        store.update_note(&id, NotePatch::content(doc("one"))).await.unwrap();
        let v1 = store.save_version(&id).await.unwrap().unwrap();
        store.update_note(&id, NotePatch::content(doc("two"))).await.unwrap();
        let v2 = store.save_version(&id).await.unwrap().unwrap();

        let versions = &store.note(&id).unwrap().versions;
        assert_eq!(versions[0].id, v2);
        assert_eq!(versions[0].content, doc("two"));
        assert_eq!(versions[1].id, v1);
        assert!(versions[0].timestamp >= versions[1].timestamp);
    }

    #[tokio::test]
    async fn test_save_after_edit_adds_version() {
        let (mut store, id) = store_with_note().await;
        store.save_version(&id).await.unwrap();

        store.update_note(&id, NotePatch::content(doc("typed"))).await.unwrap();
        assert!(store.save_version(&id).await.unwrap().is_some());
        assert_eq!(store.note(&id).unwrap().versions.len(), 2);
    }

    #[tokio::test]
    async fn test_title_edit_does_not_count_as_change() {
        let (mut store, id) = store_with_note().await;
        store.save_version(&id).await.unwrap();

        store.update_note(&id, NotePatch::title("renamed")).await.unwrap();
        assert!(store.save_version(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_is_non_destructive() {
        let (mut store, id) = store_with_note().await;
        let v1_content: DocumentValue = json!({"type": "doc", "content": [{"type": "paragraph"}]}).into();

        store
            .update_note(&id, NotePatch::content(v1_content.clone()))
            .await
            .unwrap();
        let v1 = store.save_version(&id).await.unwrap().unwrap();
        store.update_note(&id, NotePatch::content(doc("later"))).await.unwrap();
        store.save_version(&id).await.unwrap().unwrap();

        let history_before = store.note(&id).unwrap().versions.clone();
        let updated_before = store.note(&id).unwrap().updated_at;

        assert!(store.restore_version(&id, &v1).await.unwrap());

        let note = store.note(&id).unwrap();
        assert_eq!(note.content, v1_content);
        assert_eq!(note.versions, history_before);
        assert!(note.updated_at >= updated_before);
    }

    #[tokio::test]
    async fn test_restore_unknown_version_is_noop() {
        let (mut store, id) = store_with_note().await;
        store.save_version(&id).await.unwrap();
        let before = store.state().clone();

        assert!(
            !store
                .restore_version(&id, &VersionId::from("nope"))
                .await
                .unwrap()
        );
        assert!(
            !store
                .restore_version(&NoteId::from("nope"), &VersionId::from("nope"))
                .await
                .unwrap()
        );
        assert_eq!(store.state(), &before);
    }

    #[tokio::test]
    async fn test_clear_versions_only_touches_one_note() {
        let mut store: TestStore = NoteStore::open(InMemoryStorage::new()).await;
        let a = store.create_note().await.unwrap();
        let b = store.create_note().await.unwrap();
        store.save_version(&a).await.unwrap();
        store.save_version(&b).await.unwrap();

        assert!(store.clear_versions(&a).await.unwrap());

        assert!(store.note(&a).unwrap().versions.is_empty());
        assert_eq!(store.note(&b).unwrap().versions.len(), 1);
        assert_eq!(store.note(&a).unwrap().content, DocumentValue::empty());

        // Already empty
        assert!(!store.clear_versions(&a).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_unknown_note_is_noop() {
        let mut store: TestStore = NoteStore::open(InMemoryStorage::new()).await;
        assert!(
            store
                .save_version(&NoteId::from("ghost"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
