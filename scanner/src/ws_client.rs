//! WebSocket client to the backend's `/ws` broadcast hub, ported from
//! `original_source/security-scanner/services/websocket_client.py`.
//! Reconnects with a fixed 5s backoff and pings every 30s to keep
//! intermediating load balancers from closing an idle connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use kure_core::models::Envelope;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[async_trait]
pub trait ExclusionChangeHandler: Send + Sync {
    async fn on_namespace_change(&self, namespace: &str, excluded: bool);
    async fn on_rule_change(&self, rule_title: &str, excluded: bool, namespace: Option<&str>);
    async fn on_registry_change(&self, registry: &str, added: bool);
}

pub struct WsClient {
    ws_url: String,
}

impl WsClient {
    pub fn new(backend_url: &str) -> Self {
        let ws_url = backend_url.replacen("https://", "wss://", 1).replacen("http://", "ws://", 1);
        WsClient { ws_url: format!("{}/ws", ws_url.trim_end_matches('/')) }
    }

    /// Runs forever: connect, dispatch messages, reconnect on any error or
    /// clean close. Intended to be spawned as its own task alongside the
    /// resource watches.
    pub async fn run(&self, handler: Arc<dyn ExclusionChangeHandler>) {
        loop {
            if let Err(e) = self.connect_once(&handler).await {
                warn!(error = %e, "websocket_connection_error");
            }
            info!(backoff_secs = RECONNECT_BACKOFF.as_secs(), "websocket_reconnecting");
            tokio::time::sleep(RECONNECT_BACKOFF).await;
        }
    }

    async fn connect_once(&self, handler: &Arc<dyn ExclusionChangeHandler>) -> anyhow::Result<()> {
        info!(url = %self.ws_url, "websocket_connecting");
        let (stream, _) = tokio_tungstenite::connect_async(&self.ws_url).await?;
        info!("websocket_connected");
        let (mut write, mut read) = stream.split();

        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        ping_interval.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    if write.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                    debug!("websocket_ping_sent");
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text, handler).await,
                        Some(Ok(Message::Close(_))) | None => {
                            info!("websocket_closed_by_server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "websocket_read_error");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn dispatch(&self, text: &str, handler: &Arc<dyn ExclusionChangeHandler>) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "websocket_message_parse_failed");
                return;
            }
        };

        match envelope.kind.as_str() {
            "namespace_exclusion_change" => {
                let namespace = envelope.data.get("namespace").and_then(|v| v.as_str()).unwrap_or_default();
                let excluded = envelope.data.get("excluded").and_then(|v| v.as_bool()).unwrap_or(false);
                handler.on_namespace_change(namespace, excluded).await;
            }
            "rule_exclusion_change" => {
                let rule_title = envelope.data.get("rule_title").and_then(|v| v.as_str()).unwrap_or_default();
                let excluded = envelope.data.get("excluded").and_then(|v| v.as_bool()).unwrap_or(false);
                let namespace = envelope.data.get("namespace").and_then(|v| v.as_str());
                handler.on_rule_change(rule_title, excluded, namespace).await;
            }
            "trusted_registry_change" => {
                let registry = envelope.data.get("registry").and_then(|v| v.as_str()).unwrap_or_default();
                let added = envelope.data.get("added").and_then(|v| v.as_bool()).unwrap_or(false);
                handler.on_registry_change(registry, added).await;
            }
            _ => {}
        }
    }
}
