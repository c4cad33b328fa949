// chat-relay - streams local Ollama generations to chat callers
//
// This crate includes:
// - Chat sessions and messages persisted in SQLite
// - An Ollama client that turns NDJSON generation output into events
// - A relay that forwards each token to the caller as it arrives
// - SSE, chunked NDJSON and WebSocket delivery over axum

use std::sync::Arc;

use anyhow::{Context, Result};

// Core modules
pub mod config;
pub mod error;
pub mod state;
pub mod database;
pub mod llm_engine;
pub mod chat;
pub mod files;
pub mod server;

pub use config::RelayConfig;
pub use error::RelayError;
pub use state::AppState;

// ============== Main App Entry ==============

pub async fn run() -> Result<()> {
    // Initialize env_logger to output to stderr (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("chat-relay starting...");
    let config = Arc::new(RelayConfig::from_env());

    let db = database::DatabaseManager::new(config.database_path())
        .context("Database initialization failed")?;

    let backend = llm_engine::OllamaProvider::new(&config.backend)
        .context("Failed to create Ollama client")?;
    log::info!(
        "Using Ollama at {} with model {}",
        config.backend.base_url,
        config.backend.model
    );

    let state = AppState::new(config, Arc::new(db), Arc::new(backend));

    if !state.backend.check_health().await {
        log::warn!("Ollama is not reachable yet; turns will fail until it is");
    }

    server::serve(state).await
}
