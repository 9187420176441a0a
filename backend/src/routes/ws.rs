//! `GET /ws` upgrade handler, the single broadcast channel shared by UI
//! and scanner connections.

use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::StreamExt;

use crate::app::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle(socket, state))
}

/// Registers the socket with the hub and drains inbound frames until the
/// client disconnects. Inbound text is not interpreted as commands today
/// — the scanner only uses this connection to receive nudges, not send
/// them — but a ping/pong and close frame still need to flow through so
/// the connection doesn't look stalled to intermediating proxies.
async fn handle(socket: axum::extract::ws::WebSocket, state: AppState) {
    let (id, mut rx) = state.hub.register(socket).await;

    while let Some(frame) = rx.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    state.hub.unregister(id).await;
}
