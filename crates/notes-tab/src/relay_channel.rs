//! Broadcast channel carried over the WebSocket relay.
//!
//! Opening a channel connects to the relay, sends the join frame, and spawns
//! a read task that feeds inbound frames to the binding. When the relay goes
//! away the read task ends, `recv` returns `None`, and the replicator drops
//! back to single-tab mode.

use crate::message::JoinMessage;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use notes_core::channel::{BroadcastChannel, ChannelBinding, ChannelError, Result};
use notes_core::protocol::MAX_MESSAGE_SIZE;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, Message>;
type WsSource = futures::stream::SplitStream<WsStream>;

/// Channel adapter backed by a relay at `url` (e.g. `ws://127.0.0.1:4517`).
#[derive(Debug, Clone)]
pub struct RelayBroadcast {
    url: String,
}

impl RelayBroadcast {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BroadcastChannel for RelayBroadcast {
    async fn open(&self, name: &str) -> Result<Box<dyn ChannelBinding>> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Unavailable(format!("{}: {}", self.url, e)))?;

        let (mut write, read) = ws_stream.split();
        write
            .send(Message::Binary(JoinMessage::new(name).to_binary().into()))
            .await
            .map_err(|e| ChannelError::Unavailable(format!("join failed: {}", e)))?;
        info!("Connected to relay {} on channel {}", self.url, name);

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let url = self.url.clone();
        let read_task = tokio::spawn(async move {
            read_loop(url, read, frame_tx).await;
        });

        Ok(Box::new(RelayBinding {
            name: name.to_string(),
            write: Mutex::new(write),
            frames: frame_rx,
            read_task: Some(read_task),
            closed: AtomicBool::new(false),
        }))
    }
}

async fn read_loop(url: String, mut read: WsSource, frame_tx: mpsc::UnboundedSender<Vec<u8>>) {
    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                let data = match msg {
                    Message::Binary(data) => data.to_vec(),
                    Message::Text(text) => text.as_bytes().to_vec(),
                    Message::Ping(_) | Message::Pong(_) => continue,
                    Message::Close(_) => {
                        debug!("Received close frame from {}", url);
                        break;
                    }
                    Message::Frame(_) => continue,
                };

                if data.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Frame from {} exceeds max size ({} > {}), dropping",
                        url,
                        data.len(),
                        MAX_MESSAGE_SIZE
                    );
                    continue;
                }

                if frame_tx.send(data).is_err() {
                    // Binding dropped
                    return;
                }
            }
            Some(Err(e)) => {
                match e {
                    WsError::ConnectionClosed | WsError::AlreadyClosed => {
                        debug!("Relay connection {} closed", url);
                    }
                    _ => {
                        error!("WebSocket error on {}: {}", url, e);
                    }
                }
                break;
            }
            None => {
                debug!("Relay stream {} ended", url);
                break;
            }
        }
    }
}

/// One tab's binding to a relay channel.
pub struct RelayBinding {
    name: String,
    write: Mutex<WsSink>,
    frames: mpsc::UnboundedReceiver<Vec<u8>>,
    read_task: Option<JoinHandle<()>>,
    closed: AtomicBool,
}

#[async_trait]
impl ChannelBinding for RelayBinding {
    fn name(&self) -> &str {
        &self.name
    }

    async fn post(&self, data: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        let mut write = self.write.lock().await;
        write
            .send(Message::Binary(data.to_vec().into()))
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.frames.recv().await
    }

    async fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.write.get_mut().send(Message::Close(None)).await;
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        self.frames.close();
    }
}

impl Drop for RelayBinding {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}
