//! Generation backend trait and types
//!
//! Defines the interface the relay uses to talk to a token-generating server

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::Serialize;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// Could not connect, or the server answered with a non-200 status
    #[error("Backend connection failed: {0}")]
    Connection(String),
    /// The connection broke (reset, idle timeout) while the body was streaming
    #[error("Backend stream interrupted: {0}")]
    Stream(String),
}

/// One typed event decoded from the backend's line stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// A non-empty text fragment
    ContentDelta(String),
    /// Generation finished
    Done,
    /// Error reported inline by the backend
    BackendError(String),
}

/// Sampling options, fixed for every request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 2048,
        }
    }
}

/// Body of `POST /api/generate`
#[derive(Debug, Clone, Serialize)]
pub struct BackendRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    /// Base64-encoded images for multimodal models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    pub options: GenerationOptions,
}

impl BackendRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: true,
            images: None,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_image(mut self, base64_image: String) -> Self {
        if !base64_image.is_empty() {
            self.images = Some(vec![base64_image]);
        }
        self
    }
}

/// Lazy sequence of generation events; dropping it closes the backend connection
pub type GenerationStream = BoxStream<'static, Result<GenerationEvent, BackendError>>;

/// The interface every generation backend implements
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Provider name for logs (e.g. "ollama")
    fn provider_name(&self) -> &'static str;

    /// Model used for new generations
    fn model(&self) -> &str;

    /// Start a streaming generation.
    ///
    /// Fails with [`BackendError::Connection`] before producing any event when the
    /// request cannot be sent or the status is not 200. Once open, the stream ends
    /// with exactly one terminal item: `Done`, `BackendError`, or an `Err`.
    async fn open_generation_stream(
        &self,
        prompt: String,
        image: Option<Bytes>,
    ) -> Result<GenerationStream, BackendError>;

    /// Best-effort liveness check; never fails
    async fn check_health(&self) -> bool;

    /// Best-effort model listing; empty on any failure
    async fn list_models(&self) -> Vec<String>;
}
