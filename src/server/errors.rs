//! HTTP rendering of relay errors

use std::collections::HashMap;

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::RelayError;

/// Error returned by every non-streaming handler
#[derive(Debug)]
pub struct ApiError(pub RelayError);

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<HashMap<String, String>>,
}

pub fn status_of(err: &RelayError) -> StatusCode {
    match err {
        RelayError::OwnershipDenied => StatusCode::BAD_REQUEST,
        RelayError::BackendConnection(_) => StatusCode::SERVICE_UNAVAILABLE,
        RelayError::BackendReported(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RelayError::FileStorage(_) => StatusCode::BAD_REQUEST,
        RelayError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        RelayError::Validation(_) => StatusCode::BAD_REQUEST,
        RelayError::NotFound(_) => StatusCode::NOT_FOUND,
        RelayError::Cancelled => StatusCode::CONFLICT,
        RelayError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        let code = self.0.code();
        if let RelayError::Persistence(detail) = &self.0 {
            log::error!("Request failed on storage: {}", detail);
        }
        let message = self.0.public_message();
        let errors = match self.0 {
            RelayError::Validation(fields) => Some(fields),
            _ => None,
        };

        let body = ErrorBody {
            code,
            message,
            timestamp: chrono::Utc::now().to_rfc3339(),
            errors,
        };
        (status, Json(body)).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let mut fields = HashMap::new();
        fields.insert("body".to_string(), rejection.body_text());
        Self(RelayError::Validation(fields))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self(RelayError::FileStorage(format!("Invalid multipart request: {}", err.body_text())))
    }
}
