//! Relay orchestrator - drives one chat turn end to end
//!
//! A turn checks ownership, stores the user message and an empty assistant
//! placeholder, then streams backend deltas to the caller while accumulating
//! them. Every turn yields exactly one `StreamStart` followed by chunks and
//! exactly one `StreamEnd` or `Error`; a turn rejected before the placeholder
//! exists yields a single `Error`.
//!
//! The accumulated text is written once, on completion. Failed and cancelled
//! turns leave the placeholder content empty and only record status.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::database::{ChatMessage, ChatMessageStatus, FileAttachment};
use crate::error::RelayError;
use crate::files::{FileStorage, StoredFile};
use crate::llm_engine::{GenerationBackend, GenerationEvent};

use super::prompt::{build_multimodal_prompt, build_text_prompt, render_context, CONTEXT_WINDOW};
use super::store::ChatStore;
use super::task_registry::TaskRegistry;
use super::types::{RelayEvent, TurnInput};

/// Events buffered between the turn task and a slow caller
const CHANNEL_CAPACITY: usize = 16;
const IMAGE_NOTE: &str = "User uploaded an image";

/// Downstream side of a running turn. Dropping it cancels the turn.
#[derive(Debug)]
pub struct RelayStream {
    rx: mpsc::Receiver<RelayEvent>,
}

impl RelayStream {
    pub async fn next_event(&mut self) -> Option<RelayEvent> {
        self.rx.recv().await
    }
}

impl Stream for RelayStream {
    type Item = RelayEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RelayEvent>> {
        self.rx.poll_recv(cx)
    }
}

/// Starts chat turns and tracks the running ones
pub struct ChatRelay {
    store: Arc<dyn ChatStore>,
    backend: Arc<dyn GenerationBackend>,
    files: Arc<FileStorage>,
    registry: Arc<TaskRegistry>,
}

impl ChatRelay {
    pub fn new(
        store: Arc<dyn ChatStore>,
        backend: Arc<dyn GenerationBackend>,
        files: Arc<FileStorage>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            store,
            backend,
            files,
            registry,
        }
    }

    /// Spawn a turn and return its event stream
    pub fn start_turn(&self, input: TurnInput) -> RelayStream {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let turn = Turn {
            store: self.store.clone(),
            backend: self.backend.clone(),
            files: self.files.clone(),
            registry: self.registry.clone(),
            tx,
        };
        tokio::spawn(turn.run(input));
        RelayStream { rx }
    }

    /// Cancel a running turn by its assistant message id
    pub fn cancel(&self, message_id: &str) -> bool {
        self.registry.cancel(message_id)
    }

    pub fn cancel_session(&self, session_id: &str) -> usize {
        self.registry.cancel_session_tasks(session_id)
    }

    pub fn is_session_processing(&self, session_id: &str) -> bool {
        self.registry.is_session_processing(session_id)
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }
}

/// How the streaming phase ended
enum Outcome {
    Completed,
    Failed(RelayError),
    Cancelled,
    /// The caller dropped its stream
    Disconnected,
}

/// Stored state of a turn that is ready to stream
struct PreparedTurn {
    session_id: String,
    message_id: String,
    prompt: String,
    image: Option<Bytes>,
    multimodal: bool,
}

/// Removes the registry entry when the turn ends, however it ends
struct Registration<'a> {
    registry: &'a TaskRegistry,
    message_id: &'a str,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.message_id);
    }
}

struct Turn {
    store: Arc<dyn ChatStore>,
    backend: Arc<dyn GenerationBackend>,
    files: Arc<FileStorage>,
    registry: Arc<TaskRegistry>,
    tx: mpsc::Sender<RelayEvent>,
}

impl Turn {
    async fn run(self, input: TurnInput) {
        let prepared = match self.prepare(&input).await {
            Ok(prepared) => prepared,
            Err(err) => {
                log::warn!("Chat turn for session {} rejected: {}", input.session_id, err);
                let _ = self
                    .tx
                    .send(RelayEvent::Error {
                        session_id: input.session_id,
                        message_id: None,
                        message: err.public_message(),
                    })
                    .await;
                return;
            }
        };

        self.stream(prepared).await;
    }

    /// Ownership check, prompt, optional upload, then the turn's two messages
    async fn prepare(&self, input: &TurnInput) -> Result<PreparedTurn, RelayError> {
        self.store
            .find_owned_session(&input.session_id, &input.user_id)
            .map_err(RelayError::persistence)?
            .ok_or(RelayError::OwnershipDenied)?;

        if let Some(image) = &input.image {
            self.files
                .validate(&image.file_name, &image.content_type, image.data.len() as u64)?;
        }

        // History is read before this turn's user message exists
        let prompt = match &input.image {
            None => {
                let history = self
                    .store
                    .recent_messages(&input.session_id, CONTEXT_WINDOW)
                    .map_err(RelayError::persistence)?;
                build_text_prompt(&input.content, &render_context(&history))
            }
            Some(_) => build_multimodal_prompt(&input.content, IMAGE_NOTE),
        };

        let stored = match &input.image {
            Some(image) => Some(
                self.files
                    .store(&image.file_name, &image.content_type, &image.data)
                    .await?,
            ),
            None => None,
        };

        // Sequence ids are assigned by the store
        let mut user_message = ChatMessage::user(&input.session_id, &input.content, 0);
        let mut assistant = ChatMessage::assistant_pending(
            &input.session_id,
            0,
            Some(self.backend.model().to_string()),
        );
        if let Err(e) = self
            .store
            .insert_turn_messages(&mut user_message, &mut assistant)
        {
            self.discard_upload(stored.as_ref()).await;
            return Err(RelayError::persistence(e));
        }

        if let (Some(image), Some(stored)) = (&input.image, &stored) {
            let attachment = FileAttachment::new(
                &user_message.id,
                &image.file_name,
                &image.content_type,
                &stored.path.to_string_lossy(),
                stored.size as i64,
            );
            if let Err(e) = self.store.save_attachment(&attachment) {
                let err = RelayError::persistence(e);
                self.record_status(&assistant.id, ChatMessageStatus::Error, Some(&err.to_string()));
                self.discard_upload(Some(stored)).await;
                return Err(err);
            }
        }

        Ok(PreparedTurn {
            session_id: input.session_id.clone(),
            message_id: assistant.id,
            prompt,
            image: input.image.as_ref().map(|image| image.data.clone()),
            multimodal: input.image.is_some(),
        })
    }

    async fn discard_upload(&self, stored: Option<&StoredFile>) {
        let Some(stored) = stored else { return };
        if let Err(e) = self.files.remove(&stored.path).await {
            log::warn!("Failed to remove orphaned upload {:?}: {}", stored.path, e);
        }
    }

    async fn stream(self, turn: PreparedTurn) {
        let session_id = turn.session_id.clone();
        let message_id = turn.message_id.clone();

        let cancel = CancellationToken::new();
        self.registry
            .register(message_id.clone(), session_id.clone(), cancel.clone());
        let _registration = Registration {
            registry: &self.registry,
            message_id: &message_id,
        };

        log::info!(
            "Starting chat turn {} in session {} via {} ({})",
            message_id,
            session_id,
            self.backend.provider_name(),
            self.backend.model()
        );

        let started = Instant::now();
        let mut accumulated = String::new();
        let mut chunk_count: u32 = 0;
        let multimodal = turn.multimodal;

        let start = RelayEvent::StreamStart {
            session_id: session_id.clone(),
            message_id: message_id.clone(),
        };
        let outcome = if self.tx.send(start).await.is_err() {
            Outcome::Disconnected
        } else {
            self.pump(turn, &cancel, &mut accumulated, &mut chunk_count)
                .await
        };

        self.finish(
            &session_id,
            &message_id,
            outcome,
            &accumulated,
            chunk_count,
            started.elapsed(),
            multimodal,
        )
        .await;
    }

    /// Forward upstream deltas until a terminal event, cancellation or caller loss.
    /// Returning drops the upstream stream, which closes the backend connection.
    async fn pump(
        &self,
        turn: PreparedTurn,
        cancel: &CancellationToken,
        accumulated: &mut String,
        chunk_count: &mut u32,
    ) -> Outcome {
        let open = self.backend.open_generation_stream(turn.prompt, turn.image);
        let mut upstream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Outcome::Cancelled,
            _ = self.tx.closed() => return Outcome::Disconnected,
            opened = open => match opened {
                Ok(stream) => stream,
                Err(e) => return Outcome::Failed(e.into()),
            },
        };

        if let Err(e) = self
            .store
            .set_message_status(&turn.message_id, ChatMessageStatus::Streaming, None)
        {
            return Outcome::Failed(RelayError::persistence(e));
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Outcome::Cancelled,
                _ = self.tx.closed() => return Outcome::Disconnected,
                next = upstream.next() => next,
            };

            match next {
                Some(Ok(GenerationEvent::ContentDelta(text))) => {
                    // Accumulate in the same step as emission
                    accumulated.push_str(&text);
                    *chunk_count += 1;
                    let chunk = RelayEvent::StreamChunk {
                        session_id: turn.session_id.clone(),
                        message_id: turn.message_id.clone(),
                        content: text,
                    };
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Outcome::Cancelled,
                        sent = self.tx.send(chunk) => {
                            if sent.is_err() {
                                return Outcome::Disconnected;
                            }
                        }
                    }
                }
                Some(Ok(GenerationEvent::Done)) => return Outcome::Completed,
                Some(Ok(GenerationEvent::BackendError(message))) => {
                    return Outcome::Failed(RelayError::BackendReported(message))
                }
                Some(Err(e)) => return Outcome::Failed(e.into()),
                None => {
                    return Outcome::Failed(RelayError::BackendConnection(
                        "Backend stream ended without a terminal event".to_string(),
                    ))
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        session_id: &str,
        message_id: &str,
        outcome: Outcome,
        accumulated: &str,
        chunk_count: u32,
        elapsed: Duration,
        multimodal: bool,
    ) {
        match outcome {
            Outcome::Completed => {
                if let Err(e) = self.store.complete_assistant_message(message_id, accumulated) {
                    let err = RelayError::persistence(e);
                    log::error!("Failed to store reply {}: {}", message_id, err);
                    self.record_status(message_id, ChatMessageStatus::Error, Some(&err.to_string()));
                    self.emit_error(session_id, message_id, &err, multimodal).await;
                    return;
                }
                if let Err(e) = self.store.touch_session(session_id) {
                    log::warn!("Failed to update activity for session {}: {:#}", session_id, e);
                }

                log::info!(
                    "Chat turn {} complete: {} chunks, {} chars in {}ms",
                    message_id,
                    chunk_count,
                    accumulated.chars().count(),
                    elapsed.as_millis()
                );
                let _ = self
                    .tx
                    .send(RelayEvent::StreamEnd {
                        session_id: session_id.to_string(),
                        message_id: message_id.to_string(),
                        chunk_count,
                        elapsed_ms: elapsed.as_millis() as u64,
                    })
                    .await;
            }
            Outcome::Failed(err) => {
                match &err {
                    RelayError::BackendReported(m) => {
                        log::warn!("Backend reported error for turn {}: {}", message_id, m)
                    }
                    RelayError::BackendConnection(m) => {
                        log::warn!("Backend connection failed for turn {}: {}", message_id, m)
                    }
                    other => log::error!("Chat turn {} failed: {}", message_id, other),
                }
                self.record_status(message_id, ChatMessageStatus::Error, Some(&err.to_string()));
                self.emit_error(session_id, message_id, &err, multimodal).await;
            }
            Outcome::Cancelled => {
                log::info!("Chat turn {} cancelled after {} chunks", message_id, chunk_count);
                self.record_status(message_id, ChatMessageStatus::Cancelled, None);
                self.emit_error(session_id, message_id, &RelayError::Cancelled, multimodal)
                    .await;
            }
            Outcome::Disconnected => {
                log::info!("Caller left chat turn {} after {} chunks", message_id, chunk_count);
                self.record_status(message_id, ChatMessageStatus::Cancelled, None);
            }
        }
    }

    fn record_status(&self, message_id: &str, status: ChatMessageStatus, error: Option<&str>) {
        if let Err(e) = self.store.set_message_status(message_id, status, error) {
            log::warn!(
                "Failed to mark message {} as {}: {:#}",
                message_id,
                status.as_str(),
                e
            );
        }
    }

    async fn emit_error(&self, session_id: &str, message_id: &str, err: &RelayError, multimodal: bool) {
        let detail = err.public_message();
        let message = match err {
            RelayError::Cancelled => detail,
            _ if multimodal => format!("Failed to process multimodal message: {}", detail),
            _ => format!("Failed to process message: {}", detail),
        };
        let _ = self
            .tx
            .send(RelayEvent::Error {
                session_id: session_id.to_string(),
                message_id: Some(message_id.to_string()),
                message,
            })
            .await;
    }
}
