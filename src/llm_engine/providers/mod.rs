//! Generation backend implementations
//!
//! Each provider implements the GenerationBackend trait for a specific server

pub mod ollama_provider;

pub use ollama_provider::OllamaProvider;
