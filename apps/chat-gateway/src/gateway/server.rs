//! WebSocket upgrade handler and per-connection event loop.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::AppState;

use super::events::ServerEvent;
use super::handler::ConnectionHandler;
use super::Gateway;

/// Sent when the server ends a session it had admitted.
const CLOSE_NORMAL: u16 = 1000;

type WsSink = SplitSink<WebSocket, Message>;

pub fn router() -> Router<AppState> {
    Router::new().route("/socket", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = bearer_token(&headers).or_else(|| params.get("token").cloned());
    let buffer = state.config.outbound_buffer;
    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| handle_connection(socket, gateway, token, buffer))
}

/// `Authorization: Bearer <token>` takes precedence over `?token=`.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

async fn handle_connection(
    socket: WebSocket,
    gateway: Arc<Gateway>,
    token: Option<String>,
    buffer: usize,
) {
    let (mut ws_tx, ws_rx) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(buffer.max(1));

    let connection_id = match gateway.on_connect(token.as_deref(), outbound_tx).await {
        Ok(id) => id,
        Err(err) => {
            tracing::debug!(error = %err, code = err.close_code(), "socket rejected");
            let _ = send_event(&mut ws_tx, &ServerEvent::socket_error(err.client_message())).await;
            let _ = send_close(&mut ws_tx, err.close_code(), err.client_message()).await;
            return;
        }
    };

    // Built once per socket; `None` means the user was disconnected
    // between admission and here.
    match gateway.handler_for(&connection_id) {
        Some(handler) => run_session(&handler, ws_tx, ws_rx, outbound_rx).await,
        None => {
            let _ = send_close(&mut ws_tx, CLOSE_NORMAL, "Disconnected").await;
        }
    }

    gateway.on_disconnect(&connection_id);
}

/// Pump client frames into the gateway and queued events out to the socket
/// until either side goes away.
async fn run_session(
    handler: &ConnectionHandler,
    mut ws_tx: WsSink,
    mut ws_rx: futures_util::stream::SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<Arc<ServerEvent>>,
) {
    let connection_id = handler.connection_id();
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handler.handle_frame(text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, %connection_id, "ws read error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                }
            }

            event = outbound_rx.recv() => {
                match event {
                    Some(event) => {
                        if send_event(&mut ws_tx, &event).await.is_err() {
                            tracing::debug!(%connection_id, "ws write failed");
                            break;
                        }
                    }
                    // The registry dropped this connection (server-side disconnect).
                    None => {
                        let _ = send_close(&mut ws_tx, CLOSE_NORMAL, "Disconnected").await;
                        break;
                    }
                }
            }
        }
    }
}

async fn send_event(ws_tx: &mut WsSink, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(?e, event = ?event.kind, "failed to serialize event");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
