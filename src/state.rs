// State management for chat-relay

use std::sync::Arc;

use crate::chat::relay::ChatRelay;
use crate::chat::task_registry::TaskRegistry;
use crate::config::RelayConfig;
use crate::database::DatabaseManager;
use crate::files::FileStorage;
use crate::llm_engine::GenerationBackend;

/// Shared handles every request handler works with
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub db: Arc<DatabaseManager>,
    pub backend: Arc<dyn GenerationBackend>,
    pub files: Arc<FileStorage>,
    pub relay: Arc<ChatRelay>,
}

impl AppState {
    /// Wire the relay over an opened database and a generation backend
    pub fn new(config: Arc<RelayConfig>, db: Arc<DatabaseManager>, backend: Arc<dyn GenerationBackend>) -> Self {
        let files = Arc::new(FileStorage::new(config.uploads.clone()));
        let relay = Arc::new(ChatRelay::new(
            db.clone(),
            backend.clone(),
            files.clone(),
            Arc::new(TaskRegistry::new()),
        ));

        Self {
            config,
            db,
            backend,
            files,
            relay,
        }
    }

    pub fn default_user(&self) -> &str {
        &self.config.default_user
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::{stream, StreamExt};
    use tempfile::{tempdir, TempDir};

    use super::AppState;
    use crate::config::{RelayConfig, UploadConfig};
    use crate::database::DatabaseManager;
    use crate::llm_engine::{BackendError, GenerationBackend, GenerationEvent, GenerationStream};

    /// Streams fixed deltas and then `Done`, or hangs after them
    pub struct StaticBackend {
        pub chunks: Vec<&'static str>,
        pub hang: bool,
    }

    impl StaticBackend {
        pub fn replying(chunks: Vec<&'static str>) -> Self {
            Self { chunks, hang: false }
        }

        pub fn hanging(chunks: Vec<&'static str>) -> Self {
            Self { chunks, hang: true }
        }
    }

    #[async_trait]
    impl GenerationBackend for StaticBackend {
        fn provider_name(&self) -> &'static str {
            "static"
        }

        fn model(&self) -> &str {
            "llava"
        }

        async fn open_generation_stream(
            &self,
            _prompt: String,
            _image: Option<Bytes>,
        ) -> Result<GenerationStream, BackendError> {
            let deltas: Vec<Result<GenerationEvent, BackendError>> = self
                .chunks
                .iter()
                .map(|c| Ok(GenerationEvent::ContentDelta(c.to_string())))
                .collect();
            let head = stream::iter(deltas);
            if self.hang {
                Ok(head.chain(stream::pending()).boxed())
            } else {
                Ok(head.chain(stream::iter(vec![Ok(GenerationEvent::Done)])).boxed())
            }
        }

        async fn check_health(&self) -> bool {
            true
        }

        async fn list_models(&self) -> Vec<String> {
            vec!["llava".to_string()]
        }
    }

    /// State over a fresh database and upload dir; keep the TempDir alive
    pub fn test_state(backend: impl GenerationBackend + 'static) -> (TempDir, AppState) {
        let dir = tempdir().unwrap();
        let config = RelayConfig {
            data_dir: dir.path().to_path_buf(),
            uploads: UploadConfig {
                upload_dir: dir.path().join("uploads"),
                max_file_size: 1024,
                allowed_types: vec!["image/png".to_string(), "image/jpeg".to_string()],
            },
            ..RelayConfig::default()
        };
        let db = DatabaseManager::new(config.database_path()).unwrap();
        let state = AppState::new(Arc::new(config), Arc::new(db), Arc::new(backend));
        (dir, state)
    }
}
