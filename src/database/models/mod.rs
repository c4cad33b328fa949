// Database models - Re-exports all domain-specific models
//
// - chat.rs: Chat sessions and messages
// - attachment.rs: Uploaded files linked to messages

mod attachment;
mod chat;

pub use attachment::FileAttachment;
pub use chat::{ChatMessage, ChatMessageStatus, ChatRole, ChatSession, SessionSummary};
