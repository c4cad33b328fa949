//! Caller identity

use axum::http::HeaderMap;

use crate::state::AppState;

pub const USER_HEADER: &str = "x-user-id";

/// User id from `X-User-Id`, or the configured default user
pub fn caller(headers: &HeaderMap, state: &AppState) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| state.default_user().to_string())
}
