//! Message routes: streamed turns as SSE or NDJSON, and cancellation

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{Stream, StreamExt};

use crate::chat::message_commands;
use crate::chat::{CancelResponse, ChatMessageRequest, ImageUpload, RelayEvent, RelayStream};
use crate::error::RelayError;
use crate::state::AppState;
use super::caller::caller;
use super::errors::ApiError;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const NDJSON: &str = "application/x-ndjson";

/// Text turn delivered as server-sent events
pub async fn send_message_sse(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatMessageRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let user_id = caller(&headers, &state);
    let Json(request) = body?;
    let stream = message_commands::send_message(&state, &user_id, request)?;
    Ok(sse_response(stream))
}

/// Text turn delivered as chunked newline-delimited JSON
pub async fn send_message_ndjson(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatMessageRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let user_id = caller(&headers, &state);
    let Json(request) = body?;
    let stream = message_commands::send_message(&state, &user_id, request)?;
    Ok(ndjson_response(stream))
}

/// Multipart turn (`sessionId`, `content`, `file`) delivered as server-sent events
pub async fn send_multimodal_sse(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let user_id = caller(&headers, &state);

    let mut session_id = None;
    let mut content = None;
    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "sessionId" => session_id = Some(field.text().await?),
            "content" => content = Some(field.text().await?),
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await?;
                image = Some(ImageUpload {
                    file_name,
                    content_type,
                    data,
                });
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| missing_field("file", "Image file is required"))?;
    let request = ChatMessageRequest {
        session_id: session_id.ok_or_else(|| missing_field("sessionId", "Session ID is required"))?,
        content: content.unwrap_or_default(),
        message_type: Some("image".to_string()),
    };

    let stream = message_commands::send_multimodal(&state, &user_id, request, image)?;
    Ok(sse_response(stream))
}

pub async fn cancel_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let user_id = caller(&headers, &state);
    Ok(Json(message_commands::cancel_message(&state, &user_id, &message_id)?))
}

/// One SSE event per relay event, named after its type
pub fn sse_response(stream: RelayStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream.map(|event| Ok::<_, Infallible>(sse_event(&event)));
    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

fn sse_event(event: &RelayEvent) -> Event {
    match Event::default().event(event.kind()).json_data(event.to_payload()) {
        Ok(sse) => sse,
        Err(e) => {
            log::error!("Failed to encode {} event: {}", event.kind(), e);
            Event::default().event("error").data("Failed to encode event")
        }
    }
}

/// One JSON object per line; the body ends after the terminal event
pub fn ndjson_response(stream: RelayStream) -> Response {
    let lines = stream.map(|event| {
        let mut line = serde_json::to_vec(&event.to_payload())?;
        line.push(b'\n');
        Ok::<_, serde_json::Error>(Bytes::from(line))
    });
    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response()
}

fn missing_field(field: &str, message: &str) -> RelayError {
    RelayError::Validation(HashMap::from([(field.to_string(), message.to_string())]))
}
