//! Live client connection.
//!
//! Each user keeps one WebSocket open at `GET /api/gen/client`. The
//! connection is registered in the pool's client registry; job events and
//! task-list nudges arrive on it as JSON text frames. A newer connection for
//! the same user supersedes this one.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval_at;
use tracing::{debug, info, warn};

use pixpool_models::WsMessage;
use pixpool_worker::{ClientHandle, PushFrame};

use crate::auth::CurrentUser;
use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

/// Configuration for WebSocket backpressure.
const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const WS_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

const ENDPOINT: &str = "client";

/// WebSocket client endpoint.
pub async fn ws_client(
    ws: WebSocketUpgrade,
    user: CurrentUser,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection(ENDPOINT);

    ws.on_upgrade(move |socket| async move {
        handle_client_socket(socket, user.id, state).await;
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    })
}

async fn handle_client_socket(socket: WebSocket, user_id: i64, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (push_tx, mut push_rx) = mpsc::channel::<PushFrame>(WS_SEND_BUFFER_SIZE);
    let handle = ClientHandle::new(push_tx);
    let connection_id = handle.id();
    state.pool.register_connection(user_id, handle).await;
    info!(user_id, connection = %connection_id, "Client connected");

    let mut heartbeat = interval_at(
        tokio::time::Instant::now() + WS_HEARTBEAT_INTERVAL,
        WS_HEARTBEAT_INTERVAL,
    );
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            frame = push_rx.recv() => {
                match frame {
                    Some(PushFrame::Text(text)) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            warn!(user_id, "WebSocket send failed, client disconnected");
                            break;
                        }
                    }
                    Some(PushFrame::Close) | None => {
                        debug!(user_id, connection = %connection_id, "Connection superseded");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > WS_CLIENT_TIMEOUT {
                    info!(user_id, "Client timed out");
                    break;
                }
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    warn!(user_id, "Heartbeat failed, client disconnected");
                    break;
                }
            }
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        metrics::record_ws_message_received(ENDPOINT);
                        if is_ping(&text)
                            && sender.send(Message::Text(WsMessage::Pong.to_json())).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(user_id, "Client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        last_activity = Instant::now();
                    }
                    Some(Err(e)) => {
                        debug!(user_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    state
        .pool
        .registry()
        .remove_if(user_id, connection_id)
        .await;
    info!(user_id, connection = %connection_id, "Client disconnected");
}

/// Client keep-alive: a bare `ping` or `{"type":"ping"}`.
fn is_ping(text: &str) -> bool {
    let text = text.trim();
    if text.eq_ignore_ascii_case("ping") {
        return true;
    }
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| value.get("type")?.as_str().map(|t| t == "ping"))
        .unwrap_or(false)
}
