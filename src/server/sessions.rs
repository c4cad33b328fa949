//! Session routes

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::chat::session_commands;
use crate::chat::{CreateSessionRequest, MessageView, UpdateSessionRequest};
use crate::database::{ChatSession, SessionSummary};
use crate::error::RelayError;
use crate::state::AppState;
use super::caller::caller;
use super::errors::ApiError;

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ChatSession>), ApiError> {
    let user_id = caller(&headers, &state);
    // The body is optional here
    let request: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            RelayError::Validation(HashMap::from([("body".to_string(), e.to_string())]))
        })?
    };
    let session = session_commands::create_session(&state, &user_id, request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let user_id = caller(&headers, &state);
    Ok(Json(session_commands::list_sessions(&state, &user_id).await?))
}

pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let user_id = caller(&headers, &state);
    Ok(Json(session_commands::get_session(&state, &user_id, &session_id).await?))
}

pub async fn rename_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    body: Result<Json<UpdateSessionRequest>, JsonRejection>,
) -> Result<Json<ChatSession>, ApiError> {
    let user_id = caller(&headers, &state);
    let Json(request) = body?;
    Ok(Json(
        session_commands::rename_session(&state, &user_id, &session_id, request).await?,
    ))
}

pub async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user_id = caller(&headers, &state);
    session_commands::delete_session(&state, &user_id, &session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn session_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let user_id = caller(&headers, &state);
    Ok(Json(
        session_commands::session_messages(&state, &user_id, &session_id).await?,
    ))
}

pub async fn session_processing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user_id = caller(&headers, &state);
    let processing = session_commands::is_processing(&state, &user_id, &session_id).await?;
    Ok(Json(json!({ "sessionId": session_id, "processing": processing })))
}
