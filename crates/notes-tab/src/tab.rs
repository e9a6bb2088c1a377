//! Tab session: the composition root of one execution context.
//!
//! A `Tab` owns the note store, the replicator and the two edit debouncers.
//! Local edits are throttled (titles stay local, content is broadcast once
//! committed); remote messages are applied immediately. The event loop in
//! [`Tab::run`] multiplexes command input, inbound replication traffic and the
//! debounce timers on one task, so store mutations never interleave.

use crate::commands::{Command, HELP, document_to_text, text_to_document};
use crate::debounce::Debouncer;
use notes_core::store::Result;
use notes_core::{
    BroadcastChannel, ChangeOrigin, CollaborationMessage, DocumentValue, KeyValueStorage, NoteId,
    NotePatch, NoteStore, Replicator, StoreEvent, Subscription,
};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Notice shown when another tab changes the open note.
pub const REMOTE_UPDATE_NOTICE: &str = "Updated by another user";

/// A debounced edit and the note it targets.
#[derive(Debug, Clone)]
struct PendingEdit<T> {
    note_id: NoteId,
    value: T,
}

pub struct Tab<S: KeyValueStorage> {
    store: NoteStore<S>,
    replicator: Replicator,
    title_edits: Debouncer<PendingEdit<String>>,
    content_edits: Debouncer<PendingEdit<DocumentValue>>,
    remote_events: Arc<Mutex<Vec<StoreEvent>>>,
    _subscription: Subscription,
}

impl<S: KeyValueStorage> Tab<S> {
    pub fn new(
        store: NoteStore<S>,
        replicator: Replicator,
        title_delay: Duration,
        content_delay: Duration,
    ) -> Self {
        let remote_events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&remote_events);
        let subscription = store.events().subscribe(move |event| {
            if let StoreEvent::NoteUpdated {
                origin: ChangeOrigin::Remote,
                ..
            }
            | StoreEvent::NoteDeleted {
                origin: ChangeOrigin::Remote,
                ..
            } = event
            {
                sink.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(event.clone());
            }
        });

        Self {
            store,
            replicator,
            title_edits: Debouncer::new(title_delay),
            content_edits: Debouncer::new(content_delay),
            remote_events,
            _subscription: subscription,
        }
    }

    pub fn store(&self) -> &NoteStore<S> {
        &self.store
    }

    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    /// Join the replication channel. Returns false in single-tab mode.
    pub async fn connect(&mut self, channel: &dyn BroadcastChannel) -> bool {
        self.replicator.connect(channel).await
    }

    /// Queue a title edit for the active note.
    pub fn edit_title(&mut self, title: String) -> bool {
        let Some(note_id) = self.store.active_note_id().cloned() else {
            return false;
        };
        self.title_edits.schedule(PendingEdit {
            note_id,
            value: title,
        });
        true
    }

    /// Queue a content edit for the active note.
    pub fn edit_content(&mut self, content: DocumentValue) -> bool {
        let Some(note_id) = self.store.active_note_id().cloned() else {
            return false;
        };
        self.content_edits.schedule(PendingEdit {
            note_id,
            value: content,
        });
        true
    }

    pub fn has_pending_edits(&self) -> bool {
        self.title_edits.is_pending() || self.content_edits.is_pending()
    }

    /// Commit the pending title edit. Titles are never broadcast.
    pub async fn flush_title(&mut self) -> Result<bool> {
        let Some(edit) = self.title_edits.take() else {
            return Ok(false);
        };
        debug!("Committing title edit for {}", edit.note_id);
        self.store
            .update_note(&edit.note_id, NotePatch::title(edit.value))
            .await
    }

    /// Commit the pending content edit and broadcast it.
    ///
    /// The broadcast carries the `updated_at` the store just assigned. It is
    /// sent even if persisting failed, since the in-memory change stands.
    pub async fn flush_content(&mut self) -> Result<bool> {
        let Some(edit) = self.content_edits.take() else {
            return Ok(false);
        };
        debug!("Committing content edit for {}", edit.note_id);
        let result = self
            .store
            .update_note(&edit.note_id, NotePatch::content(edit.value))
            .await;

        if !matches!(result, Ok(false)) {
            if let Some(note) = self.store.note(&edit.note_id) {
                self.replicator
                    .broadcast_update(&note.id, &note.content, note.updated_at)
                    .await;
            }
        }
        result
    }

    /// Commit both pending edits now.
    pub async fn flush(&mut self) -> Result<()> {
        let title = self.flush_title().await;
        let content = self.flush_content().await;
        title?;
        content?;
        Ok(())
    }

    fn cancel_edits_for(&mut self, note_id: &NoteId) {
        if self.title_edits.peek().is_some_and(|e| e.note_id == *note_id) {
            self.title_edits.cancel();
        }
        if self.content_edits.peek().is_some_and(|e| e.note_id == *note_id) {
            self.content_edits.cancel();
        }
    }

    /// Create a note and open it.
    pub async fn create_note(&mut self) -> Result<NoteId> {
        self.flush().await?;
        self.store.create_note().await
    }

    /// Change the active note, committing edits to the previous one first.
    pub async fn select(&mut self, note_id: Option<NoteId>) -> Result<()> {
        if self.store.active_note_id() != note_id.as_ref() {
            self.flush().await?;
        }
        self.store.set_active_note(note_id).await
    }

    /// Delete a note locally and tell other tabs right away.
    pub async fn delete(&mut self, note_id: &NoteId) -> Result<bool> {
        self.cancel_edits_for(note_id);
        let result = self.store.delete_note(note_id).await;
        if !matches!(result, Ok(false)) {
            self.replicator.broadcast_delete(note_id).await;
        }
        result
    }

    /// Apply a message from another tab. Never re-broadcast.
    pub async fn handle_remote(&mut self, msg: CollaborationMessage) -> Result<bool> {
        if let CollaborationMessage::DeleteNote { note_id, .. } = &msg {
            self.cancel_edits_for(note_id);
        }
        self.store.apply_remote(msg).await
    }

    /// User-facing notices about remote changes since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        let events = std::mem::take(
            &mut *self
                .remote_events
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        );
        events
            .into_iter()
            .filter_map(|event| match event {
                StoreEvent::NoteUpdated { note_id, .. }
                    if self.store.active_note_id() == Some(&note_id) =>
                {
                    Some(REMOTE_UPDATE_NOTICE.to_string())
                }
                StoreEvent::NoteDeleted { note_id, .. } => {
                    Some(format!("Note {} was deleted in another tab", note_id))
                }
                _ => None,
            })
            .collect()
    }

    /// Cancel pending edits and leave the channel.
    pub async fn shutdown(&mut self) {
        if self.has_pending_edits() {
            info!("Discarding pending edits");
        }
        self.title_edits.cancel();
        self.content_edits.cancel();
        self.replicator.disconnect().await;
    }

    /// Run one command and return the text to show.
    pub async fn execute(&mut self, command: Command) -> Result<String> {
        match command {
            Command::New => {
                let id = self.create_note().await?;
                Ok(format!("Created note {}", id))
            }
            Command::List => Ok(self.render_list()),
            Command::Open(id) => {
                if self.store.note(&id).is_none() {
                    return Ok(format!("No such note: {}", id));
                }
                self.select(Some(id.clone())).await?;
                Ok(format!("Opened {}", id))
            }
            Command::Close => {
                self.select(None).await?;
                Ok(String::new())
            }
            Command::Show => Ok(self.render_active()),
            Command::Title(title) => Ok(queued(self.edit_title(title))),
            Command::Write(doc) => Ok(queued(self.edit_content(doc))),
            Command::Text(text) => Ok(queued(self.edit_content(text_to_document(&text)))),
            Command::Delete(id) => {
                let Some(id) = id.or_else(|| self.store.active_note_id().cloned()) else {
                    return Ok("No note open".to_string());
                };
                if self.delete(&id).await? {
                    Ok(format!("Deleted note {}", id))
                } else {
                    Ok(format!("No such note: {}", id))
                }
            }
            Command::Save => {
                let Some(id) = self.store.active_note_id().cloned() else {
                    return Ok("No note open".to_string());
                };
                self.flush().await?;
                match self.store.save_version(&id).await? {
                    Some(version_id) => Ok(format!("Saved version {}", version_id)),
                    None => Ok("No changes since the last version".to_string()),
                }
            }
            Command::History => Ok(self.render_history()),
            Command::Restore(version_id) => {
                let Some(id) = self.store.active_note_id().cloned() else {
                    return Ok("No note open".to_string());
                };
                self.flush().await?;
                if self.store.restore_version(&id, &version_id).await? {
                    Ok(format!("Restored version {}", version_id))
                } else {
                    Ok(format!("No such version: {}", version_id))
                }
            }
            Command::ClearHistory => {
                let Some(id) = self.store.active_note_id().cloned() else {
                    return Ok("No note open".to_string());
                };
                if self.store.clear_versions(&id).await? {
                    Ok("Version history cleared".to_string())
                } else {
                    Ok("No versions to clear".to_string())
                }
            }
            Command::ClearAll => {
                self.title_edits.cancel();
                self.content_edits.cancel();
                self.store.clear_all_data().await?;
                Ok("All notes deleted".to_string())
            }
            Command::Reload => {
                self.flush().await?;
                if self.store.reload().await? {
                    Ok(format!("Reloaded {} note(s)", self.store.notes().len()))
                } else {
                    Ok("Nothing stored, kept current notes".to_string())
                }
            }
            Command::Flush => {
                self.flush().await?;
                Ok(String::new())
            }
            Command::Help => Ok(HELP.to_string()),
            Command::Quit => Ok(String::new()),
        }
    }

    fn render_list(&self) -> String {
        let notes = self.store.notes();
        if notes.is_empty() {
            return "No notes".to_string();
        }
        let active = self.store.active_note_id();
        notes
            .iter()
            .map(|note| {
                let marker = if active == Some(&note.id) { '*' } else { ' ' };
                format!(
                    "{} {}  {}  ({} version(s))",
                    marker,
                    note.id,
                    note.display_title(),
                    note.versions.len()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_active(&self) -> String {
        let Some(note) = self.store.get_active_note() else {
            return "No note open".to_string();
        };
        format!(
            "# {}\nid: {}  updated: {}\n\n{}",
            note.display_title(),
            note.id,
            note.updated_at,
            document_to_text(&note.content)
        )
    }

    fn render_history(&self) -> String {
        let Some(note) = self.store.get_active_note() else {
            return "No note open".to_string();
        };
        if note.versions.is_empty() {
            return "No versions".to_string();
        }
        note.versions
            .iter()
            .map(|v| {
                let text = document_to_text(&v.content);
                let first_line = text.lines().next().unwrap_or("");
                format!("{}  {}  {}", v.id, v.timestamp, first_line)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Event loop: commands from `input`, replies to `out`.
    ///
    /// `quit` and end of input commit pending edits before shutting down;
    /// Ctrl+C discards them.
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("Input closed");
                        self.flush_or_warn().await;
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<Command>() {
                        Ok(Command::Quit) => {
                            self.flush_or_warn().await;
                            break;
                        }
                        Ok(command) => match self.execute(command).await {
                            Ok(reply) if reply.is_empty() => {}
                            Ok(reply) => writeln!(out, "{}", reply)?,
                            Err(e) => writeln!(out, "Error: {}", e)?,
                        },
                        Err(e) => writeln!(out, "{}", e)?,
                    }
                }

                Some(msg) = self.replicator.recv::<DocumentValue>(), if self.replicator.is_connected() => {
                    if let Err(e) = self.handle_remote(msg).await {
                        warn!("Failed to persist remote change: {}", e);
                    }
                }

                _ = self.title_edits.ready(), if self.title_edits.is_pending() => {
                    if let Err(e) = self.flush_title().await {
                        writeln!(out, "Error: {}", e)?;
                    }
                }

                _ = self.content_edits.ready(), if self.content_edits.is_pending() => {
                    if let Err(e) = self.flush_content().await {
                        writeln!(out, "Error: {}", e)?;
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }

            for notice in self.take_notices() {
                writeln!(out, "{}", notice)?;
            }
            out.flush()?;
        }

        self.shutdown().await;
        Ok(())
    }

    async fn flush_or_warn(&mut self) {
        if let Err(e) = self.flush().await {
            warn!("Failed to commit pending edits: {}", e);
        }
    }
}

fn queued(accepted: bool) -> String {
    if accepted {
        String::new()
    } else {
        "No note open".to_string()
    }
}
