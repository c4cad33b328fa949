//! File routes

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::database::FileAttachment;
use crate::files::commands;
use crate::state::AppState;
use super::caller::caller;
use super::errors::ApiError;

/// Stored bytes with the upload's content type, as a download
pub async fn get_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let user_id = caller(&headers, &state);
    let (attachment, data) = commands::read_file(&state, &user_id, &file_id).await?;

    let content_type = HeaderValue::from_str(&attachment.file_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        attachment.file_name.replace('"', "")
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        data,
    )
        .into_response())
}

pub async fn file_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> Result<Json<FileAttachment>, ApiError> {
    let user_id = caller(&headers, &state);
    Ok(Json(commands::file_info(&state, &user_id, &file_id)?))
}

pub async fn delete_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user_id = caller(&headers, &state);
    commands::delete_file(&state, &user_id, &file_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
