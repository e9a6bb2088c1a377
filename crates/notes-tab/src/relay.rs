//! WebSocket relay between tab processes.
//!
//! The relay carries broadcast channels across process boundaries. A client
//! connects, sends a join frame naming a channel, and from then on every
//! frame it sends is forwarded to every other client on the same channel.
//! Frames are never echoed to their sender and never interpreted.

use crate::connection::{ClientConnection, ConnectionEvent, IncomingFrame};
use anyhow::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};

/// Relay server state.
pub struct RelayServer {
    /// Live connections indexed by conn_id
    connections: HashMap<String, ClientConnection>,
    next_conn_id: u64,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    event_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl RelayServer {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            connections: HashMap::new(),
            next_conn_id: 1,
            event_tx,
            event_rx,
        }
    }

    /// Bind to an address and return the TCP listener.
    pub async fn bind(listen_addr: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(listen_addr).await?;
        info!("Relay listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Upgrade a new TCP connection to WebSocket and start tracking it.
    pub async fn accept_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                // Plain TCP checks connect and close without a WebSocket handshake
                let err_str = e.to_string();
                if err_str.contains("Handshake not finished")
                    || err_str.contains("Connection reset")
                    || err_str.contains("unexpected EOF")
                {
                    debug!("Connection closed before handshake from {}", addr);
                } else {
                    error!("WebSocket upgrade failed for {}: {}", addr, e);
                }
                return;
            }
        };

        let conn_id = format!("conn-{}", self.next_conn_id);
        self.next_conn_id += 1;
        info!("New connection from {} ({})", addr, conn_id);

        let conn = ClientConnection::new(conn_id.clone(), ws_stream, self.event_tx.clone());
        self.connections.insert(conn_id, conn);
    }

    /// Wait for the next connection event.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Apply one connection event: record joins, forward frames, drop
    /// closed connections.
    pub async fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Join { conn_id, channel } => {
                if let Some(conn) = self.connections.get_mut(&conn_id) {
                    info!("{} joined channel {}", conn_id, channel);
                    conn.channel = Some(channel);
                }
            }
            ConnectionEvent::Frame(frame) => self.forward(frame).await,
            ConnectionEvent::Closed { conn_id } => {
                if self.connections.remove(&conn_id).is_some() {
                    info!("{} disconnected", conn_id);
                }
            }
        }
    }

    async fn forward(&self, frame: IncomingFrame) {
        let Some(channel) = self
            .connections
            .get(&frame.conn_id)
            .and_then(|c| c.channel.as_deref())
        else {
            debug!("Dropping frame from {} (no channel joined)", frame.conn_id);
            return;
        };

        let mut delivered = 0;
        for (conn_id, conn) in &self.connections {
            if *conn_id == frame.conn_id || conn.channel.as_deref() != Some(channel) {
                continue;
            }
            match conn.send(&frame.data).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to relay to {}: {}", conn_id, e),
            }
        }
        debug!(
            "Relayed {} bytes on {} from {} to {} client(s)",
            frame.data.len(),
            channel,
            frame.conn_id,
            delivered
        );
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of connections joined to `channel`.
    pub fn channel_members(&self, channel: &str) -> usize {
        self.connections
            .values()
            .filter(|c| c.channel.as_deref() == Some(channel))
            .count()
    }

    /// Serve forever. Drop the future to stop.
    pub async fn run(mut self, listener: TcpListener) {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept_connection(stream, addr).await,
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }
                Some(event) = self.next_event() => {
                    self.handle_event(event).await;
                }
            }
        }
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new()
    }
}
