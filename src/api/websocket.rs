use axum::{
    extract::ws::{WebSocket, WebSocketUpgrade, Message},
    response::Response,
    extract::State,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};
use crate::api::ApiState;

/// `GET /ws/ticks`: pushes every routed tick as a JSON text frame.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut ticks = state.relay.subscribe();
    let subscription = ticks.id();
    debug!(subscription = %subscription, "WebSocket client attached");

    // Forward ticks until the relay stops or the client goes away
    let mut send_task = tokio::spawn(async move {
        while let Some(tick) = ticks.next().await {
            let msg = match serde_json::to_string(&tick) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "Failed to encode tick");
                    continue;
                }
            };
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Clients have nothing to say; drain until close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
    debug!(subscription = %subscription, "WebSocket client detached");
}
