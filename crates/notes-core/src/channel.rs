//! Broadcast channel adapter.
//!
//! A named publish/subscribe channel that delivers every posted frame to all
//! other bindings on the same name. Delivery is best-effort: no acks, no
//! retries, FIFO per sender on one channel, no ordering across channels.
//!
//! Implementations:
//! - `LocalBroadcast` - In-process hub, one binding per simulated tab
//! - `Unavailable` - Environment without a broadcast primitive
//! - `RelayBroadcast` (in notes-tab) - WebSocket relay between processes

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Broadcast channel unavailable: {0}")]
    Unavailable(String),

    #[error("Channel closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// One endpoint bound to a named channel.
#[async_trait]
pub trait ChannelBinding: Send + Sync {
    /// Name of the channel this binding is attached to.
    fn name(&self) -> &str;

    /// Publish a frame to every other binding on the channel.
    async fn post(&self, data: &[u8]) -> Result<()>;

    /// Next inbound frame. `None` once the binding is closed.
    async fn recv(&mut self) -> Option<Vec<u8>>;

    /// Release the binding. Further posts fail with `Closed`.
    async fn close(&mut self);
}

/// Factory for channel bindings.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    /// Bind to the channel called `name`.
    async fn open(&self, name: &str) -> Result<Box<dyn ChannelBinding>>;
}

/// Adapter for environments that have no broadcast primitive.
///
/// Every `open` fails, which puts replication into single-tab mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

#[async_trait]
impl BroadcastChannel for Unavailable {
    async fn open(&self, name: &str) -> Result<Box<dyn ChannelBinding>> {
        Err(ChannelError::Unavailable(format!(
            "no broadcast primitive for channel {}",
            name
        )))
    }
}

type Listeners = HashMap<String, Vec<(u64, mpsc::UnboundedSender<Vec<u8>>)>>;

/// In-process broadcast hub.
///
/// Cheap to clone; clones share the same set of channels. Each binding is
/// one simulated tab.
#[derive(Clone, Default)]
pub struct LocalBroadcast {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    listeners: RwLock<Listeners>,
    next_id: AtomicU64,
    /// Also deliver frames back to the sending binding.
    echo_to_sender: bool,
}

impl LocalBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// A hub that also delivers each frame to its sender, like some
    /// environments do.
    pub fn with_echo() -> Self {
        Self {
            inner: Arc::new(HubInner {
                echo_to_sender: true,
                ..Default::default()
            }),
        }
    }

    /// Number of open bindings on `name`.
    pub fn binding_count(&self, name: &str) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map_or(0, Vec::len)
    }
}

impl HubInner {
    fn publish(&self, name: &str, sender_id: u64, data: &[u8]) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let Some(bound) = listeners.get_mut(name) else {
            return;
        };
        // Drop listeners whose receiving side has gone away.
        bound.retain(|(id, tx)| {
            if *id == sender_id && !self.echo_to_sender {
                return true;
            }
            tx.unbounded_send(data.to_vec()).is_ok()
        });
    }

    fn unbind(&self, name: &str, id: u64) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        if let Some(bound) = listeners.get_mut(name) {
            bound.retain(|(i, _)| *i != id);
            if bound.is_empty() {
                listeners.remove(name);
            }
        }
    }
}

#[async_trait]
impl BroadcastChannel for LocalBroadcast {
    async fn open(&self, name: &str) -> Result<Box<dyn ChannelBinding>> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded();
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_default()
            .push((id, tx));

        Ok(Box::new(LocalBinding {
            hub: Arc::downgrade(&self.inner),
            name: name.to_string(),
            id,
            rx,
            closed: false,
        }))
    }
}

/// Binding handed out by [`LocalBroadcast`]. Unbinds on drop.
pub struct LocalBinding {
    hub: Weak<HubInner>,
    name: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: bool,
}

#[async_trait]
impl ChannelBinding for LocalBinding {
    fn name(&self) -> &str {
        &self.name
    }

    async fn post(&self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        let hub = self.hub.upgrade().ok_or(ChannelError::Closed)?;
        hub.publish(&self.name, self.id, data);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        if self.closed {
            return None;
        }
        self.rx.next().await
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(hub) = self.hub.upgrade() {
            hub.unbind(&self.name, self.id);
        }
        self.rx.close();
    }
}

impl Drop for LocalBinding {
    fn drop(&mut self) {
        if !self.closed {
            if let Some(hub) = self.hub.upgrade() {
                hub.unbind(&self.name, self.id);
            }
        }
    }
}
