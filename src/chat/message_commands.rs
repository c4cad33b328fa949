//! Chat message commands - send and cancel turns

use validator::Validate;

use crate::error::RelayError;
use crate::state::AppState;
use super::relay::RelayStream;
use super::types::{CancelResponse, ChatMessageRequest, ImageUpload, TurnInput};

/// Validate a text message and start its turn
pub fn send_message(state: &AppState, user_id: &str, request: ChatMessageRequest) -> Result<RelayStream, RelayError> {
    request.validate()?;

    log::debug!("Starting text turn in session {} for user {}", request.session_id, user_id);
    Ok(state
        .relay
        .start_turn(TurnInput::text(request.session_id, user_id, request.content)))
}

/// Validate a message with an attached image and start its turn
pub fn send_multimodal(
    state: &AppState,
    user_id: &str,
    request: ChatMessageRequest,
    image: ImageUpload,
) -> Result<RelayStream, RelayError> {
    request.validate()?;

    log::debug!(
        "Starting image turn in session {} for user {} ({}, {} bytes)",
        request.session_id,
        user_id,
        image.content_type,
        image.data.len()
    );
    let input = TurnInput::text(request.session_id, user_id, request.content).with_image(image);
    Ok(state.relay.start_turn(input))
}

/// Cancel a running turn by its assistant message id
pub fn cancel_message(state: &AppState, user_id: &str, message_id: &str) -> Result<CancelResponse, RelayError> {
    let session_id = state
        .relay
        .registry()
        .session_of(message_id)
        .ok_or_else(|| RelayError::NotFound("Running message".to_string()))?;

    // Someone else's turn looks the same as no turn
    let owned = state
        .db
        .find_owned_session(&session_id, user_id)
        .map_err(RelayError::persistence)?;
    if owned.is_none() {
        return Err(RelayError::NotFound("Running message".to_string()));
    }

    let cancelled = state.relay.cancel(message_id);
    log::info!("Cancel requested for message {} (cancelled: {})", message_id, cancelled);

    Ok(CancelResponse {
        message_id: message_id.to_string(),
        cancelled,
    })
}
