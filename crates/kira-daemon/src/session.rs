//! Per-connection WebSocket handling for the daemon's single `/` route,
//! grounded on `original_source/src/kira/agent/daemon.py`'s
//! `_handle_connection`/`_handle_message`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::daemon::AgentDaemon;
use crate::protocol::{error_code, IncomingMessage, OutgoingMessage};

/// Origin prefixes the original accepts verbatim (`startswith`, not an exact
/// scheme+host match) — `https://` alone allows any TLS origin, since a
/// locally-run daemon has no fixed set of browser origins to pin to.
const ALLOWED_ORIGIN_PREFIXES: &[&str] = &["http://localhost", "http://127.0.0.1", "https://"];

fn origin_allowed(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get("origin").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    ALLOWED_ORIGIN_PREFIXES.iter().any(|prefix| origin.starts_with(prefix))
}

pub async fn daemon_ws(
    ws: WebSocketUpgrade,
    State(daemon): State<AgentDaemon>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !origin_allowed(&headers) {
        return axum::http::StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| handle_connection(socket, daemon))
}

async fn handle_connection(socket: WebSocket, daemon: AgentDaemon) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutgoingMessage>();

    let forwarder = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    warn!(error = %e, "failed to serialize outgoing message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4().to_string();
    let mut activated_session: Option<String> = None;

    let _ = tx.send(daemon.status_message().await);

    while let Some(incoming) = ws_rx.next().await {
        let frame = match incoming {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(Message::Text(text)) => text,
            Ok(_) => continue,
        };

        let parsed: Result<IncomingMessage, _> = serde_json::from_str(&frame);
        match parsed {
            Ok(IncomingMessage::Ping) => {
                daemon.handle_ping(&tx).await;
            }
            Ok(IncomingMessage::PickDirectory { request_id, .. }) => {
                daemon.handle_pick_directory(request_id, &tx).await;
            }
            Ok(IncomingMessage::Activate { session_id, token, server_url }) => {
                activated_session = Some(session_id.clone());
                daemon.handle_activate(session_id, token, server_url, &tx).await;
            }
            Ok(IncomingMessage::Deactivate { session_id }) => {
                daemon.handle_deactivate(&session_id).await;
            }
            Err(e) => {
                debug!(error = %e, "invalid message from client");
                let _ = tx.send(OutgoingMessage::error(error_code::INVALID_JSON, e.to_string()));
            }
        }
    }

    if let Some(session_id) = activated_session {
        daemon.remove_session(&session_id).await;
    }
    drop(tx);
    forwarder.abort();
    debug!(connection_id, "connection closed");
}
