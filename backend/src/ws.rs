//! WebSocket hub: one registry of connected clients, shared by UI and
//! scanner connections, the Rust analogue of
//! `original_source/backend/services/websocket.py`'s `WebSocketManager`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use kure_core::metrics::WS_CONNECTED_CLIENTS;
use kure_core::models::Envelope;
use tokio::sync::{mpsc, RwLock};

struct Client {
    id: u64,
    sender: mpsc::UnboundedSender<Message>,
}

/// Oblivious to client kind: scanners and UIs share the same channel.
#[derive(Clone, Default)]
pub struct Hub {
    clients: Arc<RwLock<Vec<Client>>>,
    next_id: Arc<AtomicU64>,
}

impl Hub {
    pub fn new() -> Self {
        Hub::default()
    }

    /// Registers a fresh socket split into a channel-fed writer task and
    /// returns the receive half so the caller can pump inbound frames
    /// (scanners send exclusion-refresh nudges; UIs send nothing of note).
    pub async fn register(&self, socket: WebSocket) -> (u64, futures::stream::SplitStream<WebSocket>) {
        use futures::StreamExt;

        let (mut ws_tx, ws_rx) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.clients.write().await.push(Client { id, sender: tx });
        WS_CONNECTED_CLIENTS.inc();

        tokio::spawn(async move {
            use futures::SinkExt;
            while let Some(msg) = rx.recv().await {
                if ws_tx.send(msg).await.is_err() {
                    break;
                }
            }
        });

        (id, ws_rx)
    }

    pub async fn unregister(&self, id: u64) {
        let mut clients = self.clients.write().await;
        let before = clients.len();
        clients.retain(|c| c.id != id);
        if clients.len() != before {
            WS_CONNECTED_CLIENTS.dec();
        }
    }

    /// Serializes `envelope` once and writes it to every connected client;
    /// a client whose channel is closed is dropped from the registry rather
    /// than allowed to block the other producers.
    pub async fn broadcast(&self, envelope: Envelope) {
        let payload = match serde_json::to_string(&envelope) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "envelope_serialize_failed");
                return;
            }
        };
        let message = Message::Text(payload);

        let mut dead = Vec::new();
        {
            let clients = self.clients.read().await;
            for client in clients.iter() {
                if client.sender.send(message.clone()).is_err() {
                    dead.push(client.id);
                }
            }
        }
        if !dead.is_empty() {
            let mut clients = self.clients.write().await;
            clients.retain(|c| !dead.contains(&c.id));
            for _ in &dead {
                WS_CONNECTED_CLIENTS.dec();
            }
        }
    }
}
