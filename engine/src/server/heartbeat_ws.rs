//! Heartbeat WebSocket

use super::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use tracing::{debug, info, warn};

pub(super) async fn heartbeat_handler(
    ws: WebSocketUpgrade,
    Path(candidate_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_heartbeat(socket, candidate_id, state))
}

/// Answer every `"ping"` with `"pong"` until the client goes away or a newer
/// connection for the same candidate takes over
async fn handle_heartbeat(mut socket: WebSocket, candidate_id: String, state: AppState) {
    let connection_id = state.heartbeat.connect(&candidate_id).await;

    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(text)) if text.trim() == "ping" => {
                if !state.heartbeat.ping(&candidate_id, connection_id).await {
                    info!(
                        "Closing superseded heartbeat connection for {}",
                        candidate_id
                    );
                    break;
                }
                if socket.send(Message::Text("pong".to_string())).await.is_err() {
                    break;
                }
            }
            Ok(Message::Text(text)) => {
                debug!("Ignoring heartbeat message from {}: {}", candidate_id, text);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Heartbeat socket error for {}: {}", candidate_id, e);
                break;
            }
        }
    }

    state.heartbeat.disconnect(&candidate_id, connection_id).await;
}
