//! WebSocket endpoint: room joins and event delivery with backpressure.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use edumart_models::{JoinRequest, RealtimeEvent};

use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

/// Configuration for WebSocket backpressure.
const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket events endpoint.
pub async fn ws_events(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    if !state.rate_limiter.check(addr.ip()).await {
        metrics::record_rate_limit_hit();
        warn!(ip = %addr.ip(), "WebSocket upgrade rate limit hit");
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }

    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection();

    ws.on_upgrade(move |socket| async move {
        handle_events_socket(socket, state).await;
        // Decrement on disconnect
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    })
    .into_response()
}

/// Per-connection loop: joins are additive, events flow until the
/// client leaves.
async fn handle_events_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut receiver) = socket.split();

    // Bounded channel so one slow client cannot buffer unboundedly.
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut joined: HashSet<String> = HashSet::new();
    let mut forwarders: Vec<tokio::task::JoinHandle<()>> = Vec::new();
    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<JoinRequest>(&text) {
                            Ok(request) => match request.room() {
                                Some(room) => {
                                    // Joins are idempotent per connection.
                                    if joined.insert(room.key()) {
                                        info!(room = %room, "Connection joined room");
                                        metrics::record_room_join(room.scope());
                                        let room_rx = state.hub.join(&room).await;
                                        forwarders.push(spawn_room_forwarder(
                                            room.key(),
                                            room_rx,
                                            tx.clone(),
                                        ));
                                    }
                                }
                                None => {
                                    send_error(&tx, "join id must not be empty").await;
                                }
                            },
                            Err(e) => {
                                send_error(&tx, &format!("invalid join message: {}", e)).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {} // pings/pongs/binary ignored
                    Some(Err(_)) => break,
                }
            }
            _ = heartbeat.tick() => {
                if tx.send(Message::Ping(Vec::new())).await.is_err() {
                    warn!("Heartbeat failed, client disconnected");
                    break;
                }
            }
        }
    }

    for forwarder in forwarders {
        forwarder.abort();
    }
    drop(tx);
    let _ = send_task.await;
}

/// Pump one joined room's events into the connection's send channel.
fn spawn_room_forwarder(
    room_key: String,
    mut room_rx: broadcast::Receiver<RealtimeEvent>,
    tx: mpsc::Sender<Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match room_rx.recv().await {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(_) => continue,
                    };
                    // try_send first; fall back to an awaited send so a
                    // full buffer applies backpressure instead of
                    // dropping the event.
                    match tx.try_send(Message::Text(json.clone())) {
                        Ok(_) => {
                            metrics::record_event_delivered(event.event_name());
                        }
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!("WebSocket send buffer full, applying backpressure");
                            if tx.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                            metrics::record_event_delivered(event.event_name());
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(room = %room_key, "Connection lagging, dropped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn send_error(tx: &mpsc::Sender<Message>, message: &str) {
    let frame = serde_json::json!({ "event": "error", "message": message });
    let _ = tx.send(Message::Text(frame.to_string())).await;
}
