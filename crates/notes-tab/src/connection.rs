//! One client connection held by the relay.
//!
//! Each connection wraps a WebSocket stream split into halves: the read half
//! is drained by a spawned task that forwards frames to the relay's event
//! channel, the write half is shared behind a mutex for forwarding.

use crate::message::JoinMessage;
use anyhow::{Result, anyhow};
use futures::{SinkExt, StreamExt};
use notes_core::protocol::MAX_MESSAGE_SIZE;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, error, warn};

type WsSink = futures::stream::SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = futures::stream::SplitStream<WebSocketStream<TcpStream>>;

/// Frame received from a client.
#[derive(Debug)]
pub struct IncomingFrame {
    /// Relay-assigned connection id (e.g., "conn-1")
    pub conn_id: String,
    /// Raw frame payload
    pub data: Vec<u8>,
}

/// Event emitted by a connection's read task.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Client asked to join a channel
    Join { conn_id: String, channel: String },
    /// Any other frame
    Frame(IncomingFrame),
    /// Connection was closed
    Closed { conn_id: String },
}

/// A WebSocket connection from a tab process.
pub struct ClientConnection {
    pub conn_id: String,
    /// Channel joined (None until the join frame arrives)
    pub channel: Option<String>,
    write: Arc<Mutex<WsSink>>,
    read_task: Option<JoinHandle<()>>,
}

impl ClientConnection {
    /// Wrap a WebSocket stream and start its read task.
    pub fn new(
        conn_id: String,
        ws_stream: WebSocketStream<TcpStream>,
        event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        let (write, read) = ws_stream.split();

        let read_conn_id = conn_id.clone();
        let read_task = tokio::spawn(async move {
            Self::read_loop(read_conn_id, read, event_tx).await;
        });

        Self {
            conn_id,
            channel: None,
            write: Arc::new(Mutex::new(write)),
            read_task: Some(read_task),
        }
    }

    async fn read_loop(
        conn_id: String,
        mut read: WsSource,
        event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) {
        loop {
            match read.next().await {
                Some(Ok(msg)) => {
                    let data = match msg {
                        Message::Binary(data) => data.to_vec(),
                        Message::Text(text) => text.as_bytes().to_vec(),
                        Message::Ping(_) | Message::Pong(_) => continue,
                        Message::Close(_) => {
                            debug!("Received close frame from {}", conn_id);
                            break;
                        }
                        Message::Frame(_) => continue,
                    };

                    if data.len() > MAX_MESSAGE_SIZE {
                        warn!(
                            "Frame from {} exceeds max size ({} > {}), dropping",
                            conn_id,
                            data.len(),
                            MAX_MESSAGE_SIZE
                        );
                        continue;
                    }

                    let event = match JoinMessage::from_binary(&data) {
                        Some(join) => ConnectionEvent::Join {
                            conn_id: conn_id.clone(),
                            channel: join.channel,
                        },
                        None => ConnectionEvent::Frame(IncomingFrame {
                            conn_id: conn_id.clone(),
                            data,
                        }),
                    };
                    if event_tx.send(event).is_err() {
                        // Relay gone
                        return;
                    }
                }
                Some(Err(e)) => {
                    match e {
                        WsError::ConnectionClosed | WsError::AlreadyClosed => {
                            debug!("Connection {} closed", conn_id);
                        }
                        _ => {
                            error!("WebSocket error on {}: {}", conn_id, e);
                        }
                    }
                    break;
                }
                None => {
                    debug!("Connection {} stream ended", conn_id);
                    break;
                }
            }
        }

        let _ = event_tx.send(ConnectionEvent::Closed { conn_id });
    }

    /// Send a binary frame to the client.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        let mut write = self.write.lock().await;
        write
            .send(Message::Binary(data.to_vec().into()))
            .await
            .map_err(|e| anyhow!("Failed to send frame: {}", e))
    }

    /// Close the connection gracefully.
    pub async fn close(&mut self) {
        if let Ok(mut write) = self.write.try_lock() {
            let _ = write.send(Message::Close(None)).await;
        }
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}
