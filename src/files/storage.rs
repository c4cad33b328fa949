//! Upload validation and on-disk storage

use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::config::UploadConfig;
use crate::error::RelayError;

/// Longest extension kept from an uploaded file name
const MAX_EXTENSION_LEN: usize = 10;

/// Where an accepted upload landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Stores uploads under the configured directory with generated names
pub struct FileStorage {
    config: UploadConfig,
}

impl FileStorage {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.config.upload_dir
    }

    /// Reject empty, oversize, disallowed or suspiciously named uploads
    pub fn validate(&self, file_name: &str, content_type: &str, size: u64) -> Result<(), RelayError> {
        if size == 0 {
            return Err(RelayError::FileStorage("Cannot upload empty file".to_string()));
        }
        if size > self.config.max_file_size {
            return Err(RelayError::FileTooLarge {
                max: self.config.max_file_size,
            });
        }
        if !self.config.is_allowed_type(content_type) {
            return Err(RelayError::FileStorage(format!(
                "File type not allowed. Allowed types: {}",
                self.config.allowed_types.join(",")
            )));
        }
        if file_name.trim().is_empty() || file_name.contains("..") {
            return Err(RelayError::FileStorage(format!("Invalid filename: {}", file_name)));
        }
        Ok(())
    }

    /// Validate and write an upload as `<upload_dir>/<uuid><ext>`
    pub async fn store(&self, file_name: &str, content_type: &str, data: &Bytes) -> Result<StoredFile, RelayError> {
        let size = data.len() as u64;
        self.validate(file_name, content_type, size)?;

        tokio::fs::create_dir_all(&self.config.upload_dir)
            .await
            .map_err(|e| RelayError::FileStorage(format!("Failed to create upload directory: {}", e)))?;

        let unique_name = format!("{}{}", uuid::Uuid::new_v4(), file_extension(file_name));
        let path = self.config.upload_dir.join(unique_name);

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| RelayError::FileStorage(format!("Failed to store file {}: {}", file_name, e)))?;

        log::debug!("Stored upload {} ({} bytes) at {:?}", file_name, size, path);
        Ok(StoredFile { path, size })
    }

    pub async fn read(&self, path: &Path) -> Result<Bytes, RelayError> {
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| RelayError::FileStorage(format!("Failed to read file {:?}: {}", path, e)))
    }

    /// Remove a stored file; a file that is already gone is not an error
    pub async fn remove(&self, path: &Path) -> Result<(), RelayError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RelayError::FileStorage(format!("Failed to delete file {:?}: {}", path, e))),
        }
    }
}

/// `.ext` of the original name, lowercased, or empty when absent or odd
fn file_extension(file_name: &str) -> String {
    match Path::new(file_name).extension().and_then(|ext| ext.to_str()) {
        Some(ext)
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}
