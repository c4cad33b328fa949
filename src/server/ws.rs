//! WebSocket route
//!
//! Each inbound text frame `{"sessionId", "content", "type"}` starts a turn.
//! Every relay event of every turn on the connection is sent back as a JSON
//! text frame. Closing the socket cancels the connection's running turns.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chat::message_commands;
use crate::chat::{ChatMessageRequest, RelayEvent, RelayStream};
use crate::state::AppState;
use super::caller::caller;

/// Frames queued for a slow socket
const OUTBOUND_CAPACITY: usize = 64;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let user_id = caller(&headers, &state);
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let connection = CancellationToken::new();
    log::debug!("WebSocket connected for user {}", user_id);

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let request = match serde_json::from_str::<ChatMessageRequest>(text.as_str()) {
                    Ok(request) => request,
                    Err(e) => {
                        let _ = out_tx.send(error_frame("", &e.to_string())).await;
                        continue;
                    }
                };
                let session_id = request.session_id.clone();
                match message_commands::send_message(&state, &user_id, request) {
                    Ok(stream) => {
                        tokio::spawn(forward(stream, out_tx.clone(), connection.child_token()));
                    }
                    Err(e) => {
                        let _ = out_tx.send(error_frame(&session_id, &e.public_message())).await;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                log::debug!("WebSocket receive failed: {}", e);
                break;
            }
        }
    }

    // Forwarders drop their relay streams, which cancels the turns
    connection.cancel();
    drop(out_tx);
    writer.abort();
    log::debug!("WebSocket closed for user {}", user_id);
}

/// Copy one turn's events to the socket until it ends or the socket closes
async fn forward(mut stream: RelayStream, out: mpsc::Sender<String>, closed: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = closed.cancelled() => break,
            event = stream.next_event() => event,
        };
        let Some(event) = event else { break };

        match serde_json::to_string(&event.to_payload()) {
            Ok(text) => {
                if out.send(text).await.is_err() {
                    break;
                }
            }
            Err(e) => log::error!("Failed to encode {} frame: {}", event.kind(), e),
        }
    }
}

/// Error frame for input rejected before a turn starts
fn error_frame(session_id: &str, detail: &str) -> String {
    let event = RelayEvent::Error {
        session_id: session_id.to_string(),
        message_id: None,
        message: format!("Error processing message: {}", detail),
    };
    serde_json::to_string(&event.to_payload()).unwrap_or_default()
}
