//! File commands - download, describe and delete uploaded attachments

use std::path::Path;

use bytes::Bytes;

use crate::database::FileAttachment;
use crate::error::RelayError;
use crate::state::AppState;

/// Attachment metadata, when it belongs to one of the caller's sessions
pub fn file_info(state: &AppState, user_id: &str, file_id: &str) -> Result<FileAttachment, RelayError> {
    state
        .db
        .find_owned_attachment(file_id, user_id)
        .map_err(RelayError::persistence)?
        .ok_or_else(|| RelayError::NotFound("File".to_string()))
}

/// Attachment metadata plus its stored bytes
pub async fn read_file(state: &AppState, user_id: &str, file_id: &str) -> Result<(FileAttachment, Bytes), RelayError> {
    let attachment = file_info(state, user_id, file_id)?;
    let data = state.files.read(Path::new(&attachment.file_path)).await?;
    Ok((attachment, data))
}

/// Remove an attachment row and its stored file
pub async fn delete_file(state: &AppState, user_id: &str, file_id: &str) -> Result<(), RelayError> {
    let attachment = file_info(state, user_id, file_id)?;

    state
        .db
        .delete_file_attachment(&attachment.id)
        .map_err(RelayError::persistence)?;
    state.files.remove(Path::new(&attachment.file_path)).await?;

    log::info!("Deleted file {} ({})", attachment.id, attachment.file_name);
    Ok(())
}
