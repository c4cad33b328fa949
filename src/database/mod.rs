// Database module for chat-relay
// Provides SQLite persistence for chat sessions, messages and file attachments

pub mod manager;
pub mod migrations;
pub mod models;
pub mod chat_repo;
pub mod chat_session_repo;
pub mod attachments_repo;

pub use manager::DatabaseManager;
pub use models::*;
