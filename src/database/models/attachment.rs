// Database models - File attachments
use serde::{Deserialize, Serialize};

/// An uploaded file stored on disk and linked to a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub id: String,
    pub message_id: String,
    pub file_name: String,
    pub file_type: String,
    /// On-disk location; never sent to callers
    #[serde(skip_serializing, default)]
    pub file_path: String,
    pub file_size: i64,
    pub uploaded_at: String,
}

impl FileAttachment {
    pub fn new(message_id: &str, file_name: &str, file_type: &str, file_path: &str, file_size: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message_id.to_string(),
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            file_path: file_path.to_string(),
            file_size,
            uploaded_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
