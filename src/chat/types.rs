//! Chat types and structures

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::database::{ChatMessage, FileAttachment};

/// One event of a chat turn, in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    StreamStart {
        session_id: String,
        message_id: String,
    },
    StreamChunk {
        session_id: String,
        message_id: String,
        content: String,
    },
    StreamEnd {
        session_id: String,
        message_id: String,
        chunk_count: u32,
        elapsed_ms: u64,
    },
    /// `message_id` is absent when the turn failed before a placeholder existed
    Error {
        session_id: String,
        message_id: Option<String>,
        message: String,
    },
}

impl RelayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayEvent::StreamStart { .. } => "stream_start",
            RelayEvent::StreamChunk { .. } => "stream_chunk",
            RelayEvent::StreamEnd { .. } => "stream_end",
            RelayEvent::Error { .. } => "error",
        }
    }

    /// Wire representation sent to callers
    pub fn to_payload(&self) -> StreamPayload {
        let (session_id, message_id, content, token_count, processing_time) = match self {
            RelayEvent::StreamStart { session_id, message_id } => {
                (session_id, Some(message_id.clone()), String::new(), None, None)
            }
            RelayEvent::StreamChunk { session_id, message_id, content } => {
                (session_id, Some(message_id.clone()), content.clone(), None, None)
            }
            RelayEvent::StreamEnd { session_id, message_id, chunk_count, elapsed_ms } => (
                session_id,
                Some(message_id.clone()),
                String::new(),
                Some(*chunk_count),
                Some(*elapsed_ms),
            ),
            RelayEvent::Error { session_id, message_id, message } => {
                (session_id, message_id.clone(), message.clone(), None, None)
            }
        };

        StreamPayload {
            event_type: self.kind(),
            session_id: session_id.clone(),
            message_id,
            content,
            metadata: StreamMetadata {
                timestamp: chrono::Utc::now().to_rfc3339(),
                token_count,
                processing_time,
            },
        }
    }
}

/// JSON object sent for every relay event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPayload {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub session_id: String,
    pub message_id: Option<String>,
    pub content: String,
    pub metadata: StreamMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetadata {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    /// Milliseconds from stream start to stream end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<u64>,
}

/// Text message sent by a caller
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRequest {
    #[validate(length(min = 1, message = "Session ID is required"))]
    pub session_id: String,
    #[validate(
        length(min = 1, max = 4000, message = "Message content must be between 1 and 4000 characters"),
        custom(function = "not_blank")
    )]
    pub content: String,
    /// Message type hint from WebSocket clients ("text" or "image"); informational
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
}

fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        let mut err = validator::ValidationError::new("blank");
        err.message = Some("Message content cannot be empty".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(max = 255, message = "Title must be at most 255 characters"))]
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateSessionRequest {
    #[validate(
        length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"),
        custom(function = "not_blank_title")
    )]
    pub title: String,
}

fn not_blank_title(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        let mut err = validator::ValidationError::new("blank");
        err.message = Some("Title cannot be empty".into());
        return Err(err);
    }
    Ok(())
}

/// A stored message together with the files attached to it
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub attachments: Vec<FileAttachment>,
}

/// Result of an explicit cancel request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub message_id: String,
    pub cancelled: bool,
}

/// An uploaded image as received from the caller
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Everything the orchestrator needs to run one turn
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub session_id: String,
    pub user_id: String,
    pub content: String,
    pub image: Option<ImageUpload>,
}

impl TurnInput {
    pub fn text(session_id: impl Into<String>, user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            content: content.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageUpload) -> Self {
        self.image = Some(image);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let event = RelayEvent::StreamChunk {
            session_id: "s1".into(),
            message_id: "m1".into(),
            content: "Hel".into(),
        };
        let json = serde_json::to_value(event.to_payload()).unwrap();

        assert_eq!(json["type"], "stream_chunk");
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["messageId"], "m1");
        assert_eq!(json["content"], "Hel");
        assert!(json["metadata"]["timestamp"].is_string());
        assert!(json["metadata"].get("tokenCount").is_none());
    }

    #[test]
    fn test_error_payload_without_message_id() {
        let event = RelayEvent::Error {
            session_id: "s1".into(),
            message_id: None,
            message: "Session not found or access denied".into(),
        };
        let json = serde_json::to_value(event.to_payload()).unwrap();

        assert_eq!(json["type"], "error");
        assert!(json["messageId"].is_null());
        assert_eq!(json["content"], "Session not found or access denied");
    }

    #[test]
    fn test_stream_end_metadata() {
        let event = RelayEvent::StreamEnd {
            session_id: "s1".into(),
            message_id: "m1".into(),
            chunk_count: 3,
            elapsed_ms: 42,
        };
        let json = serde_json::to_value(event.to_payload()).unwrap();
        assert_eq!(json["metadata"]["tokenCount"], 3);
        assert_eq!(json["metadata"]["processingTime"], 42);
    }

    #[test]
    fn test_message_validation() {
        let ok: ChatMessageRequest =
            serde_json::from_value(serde_json::json!({"sessionId": "s", "content": "hi"})).unwrap();
        assert!(ok.validate().is_ok());

        let blank = ChatMessageRequest { content: "   ".into(), ..ok.clone() };
        assert!(blank.validate().is_err());

        let long = ChatMessageRequest { content: "x".repeat(4001), ..ok.clone() };
        assert!(long.validate().is_err());

        // Limit counts characters, not bytes
        let wide = ChatMessageRequest { content: "é".repeat(4000), ..ok };
        assert!(wide.validate().is_ok());
    }

    #[test]
    fn test_title_validation() {
        assert!(UpdateSessionRequest { title: "x".repeat(255) }.validate().is_ok());
        assert!(UpdateSessionRequest { title: "x".repeat(256) }.validate().is_err());
        assert!(UpdateSessionRequest { title: " ".into() }.validate().is_err());
        assert!(CreateSessionRequest { title: None }.validate().is_ok());
    }
}
