// Database models - Chat
use serde::{Deserialize, Serialize};

/// Chat message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "assistant" => ChatRole::Assistant,
            _ => ChatRole::User,
        }
    }

    /// Speaker label used when rendering conversation context
    pub fn label(&self) -> &'static str {
        match self {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        }
    }
}

/// Chat message status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatMessageStatus {
    Pending,
    Streaming,
    Complete,
    Cancelled,
    Error,
}

impl ChatMessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMessageStatus::Pending => "pending",
            ChatMessageStatus::Streaming => "streaming",
            ChatMessageStatus::Complete => "complete",
            ChatMessageStatus::Cancelled => "cancelled",
            ChatMessageStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => ChatMessageStatus::Pending,
            "streaming" => ChatMessageStatus::Streaming,
            "complete" => ChatMessageStatus::Complete,
            "cancelled" => ChatMessageStatus::Cancelled,
            "error" => ChatMessageStatus::Error,
            _ => ChatMessageStatus::Complete,
        }
    }
}

/// A message in a chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: String,
    pub sequence_id: i64,
    pub status: ChatMessageStatus,
    pub error_message: Option<String>,
    /// The model that produced an assistant message
    #[serde(default)]
    pub model_id: Option<String>,
}

impl ChatMessage {
    /// Create a new user message for a session
    pub fn user(session_id: &str, content: &str, sequence_id: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role: ChatRole::User,
            content: content.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            sequence_id,
            status: ChatMessageStatus::Complete,
            error_message: None,
            model_id: None,
        }
    }

    /// Create the empty assistant placeholder that a turn fills in
    pub fn assistant_pending(session_id: &str, sequence_id: i64, model_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role: ChatRole::Assistant,
            content: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
            sequence_id,
            status: ChatMessageStatus::Pending,
            error_message: None,
            model_id,
        }
    }
}

/// A chat session owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ChatSession {
    /// Create a new active session
    pub fn new(user_id: &str, title: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            status: "active".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Session row plus its message count, for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: ChatSession,
    pub message_count: i64,
}
