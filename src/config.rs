//! Process configuration
//!
//! Built once at startup from defaults, an optional `.env` file and the
//! process environment, then shared by `Arc` with every component.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Connection settings for the Ollama generation server
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Read from the environment but never consulted: the relay path has no retries.
    pub max_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llava".to_string(),
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Limits applied to uploaded images
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub upload_dir: PathBuf,
    pub max_file_size: u64,
    pub allowed_types: Vec<String>,
}

impl UploadConfig {
    fn with_data_dir(data_dir: &std::path::Path) -> Self {
        Self {
            upload_dir: data_dir.join("uploads"),
            max_file_size: 10 * 1024 * 1024,
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
            ],
        }
    }

    pub fn is_allowed_type(&self, content_type: &str) -> bool {
        let content_type = content_type.trim();
        self.allowed_types.iter().any(|t| t == content_type)
    }
}

/// Top-level relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub default_user: String,
    pub backend: BackendConfig,
    pub uploads: UploadConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chat-relay");

        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            uploads: UploadConfig::with_data_dir(&data_dir),
            data_dir,
            default_user: "default-user".to_string(),
            backend: BackendConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load `.env` (if any) and overlay environment variables on the defaults
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            log::debug!("No .env file loaded: {}", e);
        }

        let mut config = Self::default();

        if let Some(dir) = env_value::<PathBuf>("CHAT_RELAY_DATA_DIR") {
            config.uploads = UploadConfig::with_data_dir(&dir);
            config.data_dir = dir;
        }
        if let Some(addr) = env_value("CHAT_RELAY_BIND") {
            config.bind_addr = addr;
        }
        if let Some(user) = env_value("CHAT_RELAY_DEFAULT_USER") {
            config.default_user = user;
        }

        if let Some(url) = env_value::<String>("OLLAMA_BASE_URL") {
            config.backend.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = env_value("OLLAMA_MODEL") {
            config.backend.model = model;
        }
        if let Some(secs) = env_value("OLLAMA_TIMEOUT_SECS") {
            config.backend.timeout_secs = secs;
        }
        if let Some(retries) = env_value("OLLAMA_MAX_RETRIES") {
            config.backend.max_retries = retries;
        }

        if let Some(dir) = env_value("CHAT_RELAY_UPLOAD_DIR") {
            config.uploads.upload_dir = dir;
        }
        if let Some(size) = env_value("CHAT_RELAY_MAX_FILE_SIZE") {
            config.uploads.max_file_size = size;
        }
        if let Some(types) = env_value::<String>("CHAT_RELAY_ALLOWED_TYPES") {
            config.uploads.allowed_types = parse_list(&types);
        }

        config
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("chat-relay.db")
    }
}

/// Read and parse a variable, keeping the default (and logging) when it does not parse
fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring unparseable value for {}: {:?}", key, raw);
            None
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
