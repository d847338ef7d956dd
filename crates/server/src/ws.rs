//! WebSocket handler: one connection, one receive loop, one forward task.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use uuid::Uuid;

use floorcast_shared::{ClientCommand, Envelope, ServerEvent};

use crate::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = Uuid::new_v4();

    let (forward_tx, mut forward_rx) = tokio::sync::mpsc::unbounded_channel();
    state.hub.connect(conn_id, forward_tx).await;
    tracing::info!(connection = %conn_id, "websocket connected");

    // Forward hub events to the transport.
    let send_task = tokio::spawn(async move {
        while let Some(event) = forward_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    tracing::error!(%err, "failed to serialize outbound event");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Sequential receive loop: per-connection FIFO dispatch.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<Envelope<ClientCommand>>(&text) {
                    Ok(envelope) => {
                        state.router.dispatch(&state.hub, conn_id, envelope).await;
                    }
                    Err(err) => {
                        // Protocol violation: reported to this connection
                        // only, shared state untouched.
                        tracing::debug!(connection = %conn_id, %err, "malformed frame");
                        state
                            .hub
                            .emit_to_connection(
                                conn_id,
                                ServerEvent::Error {
                                    code: "MALFORMED_PAYLOAD".into(),
                                    message: format!("could not parse event: {err}"),
                                    correlation_id: None,
                                },
                            )
                            .await;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            // Ping/pong handled by the transport, binary ignored.
            _ => {}
        }
    }

    send_task.abort();
    state.hub.disconnect(conn_id).await;
    tracing::info!(connection = %conn_id, "websocket closed");
}
