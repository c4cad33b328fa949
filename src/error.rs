//! Error kinds surfaced by the relay

use std::collections::HashMap;

use crate::llm_engine::BackendError;

/// Every failure a chat turn or API call can end with
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Non-2xx status, connect failure, or the stream broke mid-body
    #[error("{0}")]
    BackendConnection(String),
    /// The backend wrote an `error` field into the stream
    #[error("{0}")]
    BackendReported(String),
    /// The session does not exist or belongs to another user
    #[error("Session not found or access denied")]
    OwnershipDenied,
    #[error("Storage failure: {0}")]
    Persistence(String),
    #[error("{0}")]
    FileStorage(String),
    #[error("File size exceeds maximum limit of {max} bytes")]
    FileTooLarge { max: u64 },
    #[error("Request validation failed")]
    Validation(HashMap<String, String>),
    #[error("Generation cancelled")]
    Cancelled,
    #[error("{0} not found")]
    NotFound(String),
}

impl RelayError {
    /// Stable code reported to callers
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::BackendConnection(_) => "OLLAMA_SERVICE_ERROR",
            RelayError::BackendReported(_) => "MODEL_SERVICE_ERROR",
            RelayError::OwnershipDenied => "CHAT_SERVICE_ERROR",
            RelayError::Persistence(_) => "INTERNAL_ERROR",
            RelayError::FileStorage(_) => "FILE_STORAGE_ERROR",
            RelayError::FileTooLarge { .. } => "FILE_SIZE_EXCEEDED",
            RelayError::Validation(_) => "VALIDATION_ERROR",
            RelayError::Cancelled => "CANCELLED",
            RelayError::NotFound(_) => "NOT_FOUND",
        }
    }

    /// Text shown to callers; storage details stay in the logs
    pub fn public_message(&self) -> String {
        match self {
            RelayError::Persistence(_) => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }

    pub fn persistence(err: anyhow::Error) -> Self {
        // {:#} keeps the anyhow context chain on one line
        RelayError::Persistence(format!("{:#}", err))
    }
}

impl From<BackendError> for RelayError {
    fn from(err: BackendError) -> Self {
        RelayError::BackendConnection(err.to_string())
    }
}

impl From<validator::ValidationErrors> for RelayError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let message = errs
                    .iter()
                    .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "invalid value".to_string());
                (field.to_string(), message)
            })
            .collect();
        RelayError::Validation(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_are_connection_failures() {
        let refused: RelayError = BackendError::Connection("connection refused".into()).into();
        assert!(matches!(refused, RelayError::BackendConnection(ref m) if m.contains("connection refused")));
        assert_eq!(refused.code(), "OLLAMA_SERVICE_ERROR");

        let network: RelayError = BackendError::Stream("connection reset".into()).into();
        assert!(matches!(network, RelayError::BackendConnection(_)));
        assert_eq!(network.code(), "OLLAMA_SERVICE_ERROR");

        let reported = RelayError::BackendReported("model not found".into());
        assert_eq!(reported.code(), "MODEL_SERVICE_ERROR");
    }

    #[test]
    fn test_persistence_keeps_context() {
        let err = anyhow::anyhow!("disk full").context("Failed to save chat message");
        let relay = RelayError::persistence(err);
        assert_eq!(relay.to_string(), "Storage failure: Failed to save chat message: disk full");
        assert_eq!(relay.public_message(), "An unexpected error occurred");
    }

    #[test]
    fn test_public_message_keeps_caller_errors() {
        assert_eq!(RelayError::OwnershipDenied.public_message(), "Session not found or access denied");
        assert_eq!(RelayError::Cancelled.public_message(), "Generation cancelled");
        assert_eq!(RelayError::BackendReported("model not found".into()).public_message(), "model not found");
    }
}
