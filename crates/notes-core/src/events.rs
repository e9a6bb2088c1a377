//! Store change notifications.
//!
//! Provides `StoreEvent` for the UI layer and `EventBus` for subscriptions.
//! The UI uses `NoteUpdated { origin: Remote }` on the active note to show
//! that another tab changed what the user is looking at.

use crate::note::{NoteId, VersionId};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeOrigin {
    /// This tab.
    Local,
    /// Another tab, via the replication channel.
    Remote,
}

/// Events emitted after a store mutation has been applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StoreEvent {
    NoteCreated {
        #[serde(rename = "noteId")]
        note_id: NoteId,
    },
    /// Title and/or content changed.
    NoteUpdated {
        #[serde(rename = "noteId")]
        note_id: NoteId,
        origin: ChangeOrigin,
    },
    NoteDeleted {
        #[serde(rename = "noteId")]
        note_id: NoteId,
        origin: ChangeOrigin,
    },
    ActiveNoteChanged {
        #[serde(rename = "noteId")]
        note_id: Option<NoteId>,
    },
    VersionSaved {
        #[serde(rename = "noteId")]
        note_id: NoteId,
        #[serde(rename = "versionId")]
        version_id: VersionId,
    },
    VersionRestored {
        #[serde(rename = "noteId")]
        note_id: NoteId,
        #[serde(rename = "versionId")]
        version_id: VersionId,
    },
    VersionsCleared {
        #[serde(rename = "noteId")]
        note_id: NoteId,
    },
    /// Every note was removed.
    DataCleared,
    /// State was re-read from storage.
    Reloaded,
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Hold this value to keep receiving events, drop it to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Event bus for publishing store events to subscribers.
///
/// Wrap in `Arc` to enable subscriptions.
#[derive(Default)]
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: Drop may run while emit holds the read lock during unwinding.
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: StoreEvent) {
        // Snapshot so a callback may subscribe without deadlocking.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn deleted(id: &str) -> StoreEvent {
        StoreEvent::NoteDeleted {
            note_id: NoteId::from(id),
            origin: ChangeOrigin::Remote,
        }
    }

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let _sub = bus.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.clone());
        });

        bus.emit(deleted("n1"));

        assert_eq!(*seen.lock().unwrap(), vec![deleted("n1")]);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let sub = bus.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });
        bus.emit(StoreEvent::DataCleared);
        drop(sub);
        bus.emit(StoreEvent::DataCleared);

        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_callback_may_subscribe() {
        let bus = Arc::new(EventBus::new());
        let inner_bus = Arc::clone(&bus);
        let held = Arc::new(Mutex::new(Vec::new()));
        let held_clone = Arc::clone(&held);

        let _sub = bus.subscribe(move |_| {
            let sub = inner_bus.subscribe(|_| {});
            held_clone.lock().unwrap().push(sub);
        });

        bus.emit(StoreEvent::Reloaded);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&deleted("abc")).unwrap();
        assert!(json.contains("\"type\":\"noteDeleted\""));
        assert!(json.contains("\"noteId\":\"abc\""));
        assert!(json.contains("\"origin\":\"remote\""));
    }
}
