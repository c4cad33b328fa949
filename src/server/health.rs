//! Health and model listing routes

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub message: String,
    pub status: &'static str,
    pub backend: BackendHealth,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendHealth {
    pub provider: &'static str,
    pub model: String,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub current: String,
    pub models: Vec<String>,
}

/// The service is up whenever it answers; the backend check only degrades it
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let available = state.backend.check_health().await;
    if !available {
        log::warn!("Health check: {} backend unreachable", state.backend.provider_name());
    }

    Json(HealthResponse {
        message: "Chat service is running".to_string(),
        status: if available { "UP" } else { "DEGRADED" },
        backend: BackendHealth {
            provider: state.backend.provider_name(),
            model: state.backend.model().to_string(),
            available,
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        current: state.backend.model().to_string(),
        models: state.backend.list_models().await,
    })
}
