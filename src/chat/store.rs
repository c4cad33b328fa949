//! Persistence seam used by the relay orchestrator

use anyhow::Result;

use crate::database::{ChatMessage, ChatMessageStatus, ChatSession, DatabaseManager, FileAttachment};

/// The storage operations a chat turn needs
pub trait ChatStore: Send + Sync {
    /// Session by id, only when owned by `user_id`
    fn find_owned_session(&self, session_id: &str, user_id: &str) -> Result<Option<ChatSession>>;

    /// Last `limit` completed, non-empty messages, oldest first
    fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;

    /// Store both messages of a turn under the session's next two sequence ids
    fn insert_turn_messages(&self, user: &mut ChatMessage, assistant: &mut ChatMessage) -> Result<()>;

    fn save_attachment(&self, attachment: &FileAttachment) -> Result<()>;

    fn set_message_status(&self, message_id: &str, status: ChatMessageStatus, error: Option<&str>) -> Result<()>;

    /// The single content write of a turn
    fn complete_assistant_message(&self, message_id: &str, content: &str) -> Result<()>;

    fn touch_session(&self, session_id: &str) -> Result<()>;
}

impl ChatStore for DatabaseManager {
    fn find_owned_session(&self, session_id: &str, user_id: &str) -> Result<Option<ChatSession>> {
        DatabaseManager::find_owned_session(self, session_id, user_id)
    }

    fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        self.get_recent_context_messages(session_id, limit)
    }

    fn insert_turn_messages(&self, user: &mut ChatMessage, assistant: &mut ChatMessage) -> Result<()> {
        DatabaseManager::insert_turn_messages(self, user, assistant)
    }

    fn save_attachment(&self, attachment: &FileAttachment) -> Result<()> {
        self.save_file_attachment(attachment)
    }

    fn set_message_status(&self, message_id: &str, status: ChatMessageStatus, error: Option<&str>) -> Result<()> {
        self.update_chat_message_status(message_id, status, error)
    }

    fn complete_assistant_message(&self, message_id: &str, content: &str) -> Result<()> {
        DatabaseManager::complete_assistant_message(self, message_id, content)
    }

    fn touch_session(&self, session_id: &str) -> Result<()> {
        self.touch_chat_session(session_id)
    }
}
