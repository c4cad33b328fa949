//! Chat session commands - create, list, rename, delete sessions

use std::path::Path;

use validator::Validate;

use crate::database::{ChatSession, SessionSummary};
use crate::error::RelayError;
use crate::state::AppState;
use super::types::{CreateSessionRequest, MessageView, UpdateSessionRequest};

/// Create a new chat session for the caller
pub async fn create_session(
    state: &AppState,
    user_id: &str,
    request: CreateSessionRequest,
) -> Result<ChatSession, RelayError> {
    request.validate()?;

    let title = match request.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => default_title(),
    };

    let session = ChatSession::new(user_id, &title);
    state
        .db
        .create_chat_session(&session)
        .map_err(RelayError::persistence)?;

    log::info!("Created chat session {} for user {}", session.id, user_id);
    Ok(session)
}

/// All of the caller's sessions, most recently active first
pub async fn list_sessions(state: &AppState, user_id: &str) -> Result<Vec<SessionSummary>, RelayError> {
    state
        .db
        .list_user_sessions(user_id)
        .map_err(RelayError::persistence)
}

/// One of the caller's sessions with its message count
pub async fn get_session(state: &AppState, user_id: &str, session_id: &str) -> Result<SessionSummary, RelayError> {
    let session = owned_session(state, user_id, session_id).map_err(not_found)?;
    let message_count = state
        .db
        .count_chat_messages(&session.id)
        .map_err(RelayError::persistence)?;

    Ok(SessionSummary { session, message_count })
}

/// Rename one of the caller's sessions
pub async fn rename_session(
    state: &AppState,
    user_id: &str,
    session_id: &str,
    request: UpdateSessionRequest,
) -> Result<ChatSession, RelayError> {
    request.validate()?;
    owned_session(state, user_id, session_id).map_err(not_found)?;

    state
        .db
        .update_chat_session_title(session_id, request.title.trim())
        .map_err(RelayError::persistence)?;

    owned_session(state, user_id, session_id)
}

/// Delete a session, cancelling its running turns and removing its files
pub async fn delete_session(state: &AppState, user_id: &str, session_id: &str) -> Result<(), RelayError> {
    owned_session(state, user_id, session_id).map_err(not_found)?;

    let cancelled = state.relay.cancel_session(session_id);
    if cancelled > 0 {
        log::info!("Cancelled {} running turn(s) of session {}", cancelled, session_id);
    }

    // Collected first: the rows cascade away with the session
    let paths = state
        .db
        .get_attachment_paths_by_session(session_id)
        .map_err(RelayError::persistence)?;

    state
        .db
        .delete_chat_session(session_id)
        .map_err(RelayError::persistence)?;

    for path in paths {
        if let Err(e) = state.files.remove(Path::new(&path)).await {
            log::warn!("Failed to remove file of deleted session {}: {}", session_id, e);
        }
    }

    log::info!("Deleted chat session {}", session_id);
    Ok(())
}

/// Messages of one of the caller's sessions, oldest first, with attachments
pub async fn session_messages(
    state: &AppState,
    user_id: &str,
    session_id: &str,
) -> Result<Vec<MessageView>, RelayError> {
    owned_session(state, user_id, session_id)?;

    let messages = state
        .db
        .get_chat_messages_by_session(session_id)
        .map_err(RelayError::persistence)?;

    messages
        .into_iter()
        .map(|message| {
            let attachments = state
                .db
                .get_attachments_by_message(&message.id)
                .map_err(RelayError::persistence)?;
            Ok(MessageView { message, attachments })
        })
        .collect()
}

/// Whether one of the caller's sessions has a turn running
pub async fn is_processing(state: &AppState, user_id: &str, session_id: &str) -> Result<bool, RelayError> {
    owned_session(state, user_id, session_id)?;
    Ok(state.relay.is_session_processing(session_id))
}

fn owned_session(state: &AppState, user_id: &str, session_id: &str) -> Result<ChatSession, RelayError> {
    state
        .db
        .find_owned_session(session_id, user_id)
        .map_err(RelayError::persistence)?
        .ok_or(RelayError::OwnershipDenied)
}

/// Session CRUD reports a missing or foreign session as not found
fn not_found(err: RelayError) -> RelayError {
    match err {
        RelayError::OwnershipDenied => RelayError::NotFound("Session".to_string()),
        other => other,
    }
}

fn default_title() -> String {
    format!("New Chat - {}", chrono::Utc::now().format("%Y-%m-%d %H:%M"))
}
