//! Ollama API provider
//!
//! Connects to a running Ollama server (default: localhost:11434) and streams
//! `/api/generate` output as [`GenerationEvent`]s.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::BackendConfig;
use crate::llm_engine::event_parser::EventParser;
use crate::llm_engine::provider::{
    BackendError, BackendRequest, GenerationBackend, GenerationEvent, GenerationStream,
};

/// Health checks must answer quickly or count as down
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Ollama model list response
#[derive(Debug, Deserialize)]
struct OllamaModelList {
    #[serde(default)]
    models: Vec<OllamaModelEntry>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelEntry {
    name: String,
}

/// Ollama generation provider
pub struct OllamaProvider {
    base_url: String,
    model: String,
    timeout: Duration,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: config.timeout(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_tags(&self) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .get(self.url("/api/tags"))
            .timeout(CHECK_TIMEOUT)
            .send()
            .await
    }
}

#[async_trait]
impl GenerationBackend for OllamaProvider {
    fn provider_name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn open_generation_stream(
        &self,
        prompt: String,
        image: Option<Bytes>,
    ) -> Result<GenerationStream, BackendError> {
        let mut request = BackendRequest::new(self.model.clone(), prompt);
        if let Some(image) = image {
            request = request.with_image(base64::engine::general_purpose::STANDARD.encode(&image));
        }

        log::debug!(
            "Opening generation stream: model={}, prompt_len={}, images={}",
            request.model,
            request.prompt.len(),
            request.images.as_ref().map_or(0, Vec::len)
        );

        let send = self
            .client
            .post(self.url("/api/generate"))
            .header(reqwest::header::ACCEPT, "application/x-ndjson")
            .json(&request)
            .send();

        // Bounds the wait for response headers; the body has its own idle timeout
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| {
                BackendError::Connection(format!(
                    "No response from Ollama within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| BackendError::Connection(format!("Failed to send request to Ollama: {}", e)))?;

        if response.status() != StatusCode::OK {
            return Err(BackendError::Connection(format!(
                "Ollama returned error code: {}",
                response.status().as_u16()
            )));
        }

        Ok(event_stream(response.bytes_stream().boxed(), self.timeout))
    }

    async fn check_health(&self) -> bool {
        match self.get_tags().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                log::debug!("Ollama health check failed: {}", e);
                false
            }
        }
    }

    async fn list_models(&self) -> Vec<String> {
        let response = match self.get_tags().await {
            Ok(response) if response.status() == StatusCode::OK => response,
            Ok(response) => {
                log::debug!("Ollama model list returned {}", response.status());
                return Vec::new();
            }
            Err(e) => {
                log::debug!("Ollama model list failed: {}", e);
                return Vec::new();
            }
        };

        match response.json::<OllamaModelList>().await {
            Ok(list) => list.models.into_iter().map(|m| m.name).collect(),
            Err(e) => {
                log::debug!("Invalid Ollama model list: {}", e);
                Vec::new()
            }
        }
    }
}

/// Pull state behind the event stream
struct StreamState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: EventParser,
    pending: VecDeque<GenerationEvent>,
    idle_timeout: Duration,
    exhausted: bool,
}

/// Turn a response body into a lazy event stream.
///
/// The body is read only when the consumer asks for the next event and nothing
/// is queued, so a slow consumer holds back the connection instead of growing a
/// buffer. A body that ends cleanly without a terminal line yields an implicit
/// `Done`; a body that breaks yields `BackendError::Stream`.
fn event_stream(
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    idle_timeout: Duration,
) -> GenerationStream {
    let state = StreamState {
        body,
        parser: EventParser::new(),
        pending: VecDeque::new(),
        idle_timeout,
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.exhausted {
                return None;
            }

            match tokio::time::timeout(state.idle_timeout, state.body.next()).await {
                Err(_) => {
                    state.exhausted = true;
                    let err = BackendError::Stream(format!(
                        "no data from Ollama for {}s",
                        state.idle_timeout.as_secs()
                    ));
                    return Some((Err(err), state));
                }
                Ok(Some(Err(e))) => {
                    state.exhausted = true;
                    return Some((Err(BackendError::Stream(e.to_string())), state));
                }
                Ok(Some(Ok(chunk))) => {
                    let events = state.parser.feed(&chunk);
                    state.pending.extend(events);
                    if state.parser.is_finished() {
                        state.exhausted = true;
                    }
                }
                Ok(None) => {
                    let events = state.parser.finish();
                    state.pending.extend(events);
                    if !state.parser.is_finished() {
                        log::debug!("Ollama closed the stream without a done line; treating as done");
                        state.pending.push_back(GenerationEvent::Done);
                    }
                    state.exhausted = true;
                }
            }
        }
    })
    .boxed()
}
