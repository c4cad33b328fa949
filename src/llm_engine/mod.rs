//! LLM Engine module for streaming generation
//!
//! Talks to a locally hosted model server over its line-delimited streaming
//! API. The relay only sees the [`GenerationBackend`] trait.

pub mod event_parser;
pub mod provider;
pub mod providers;

pub use event_parser::{EventParser, LineOutcome};
pub use provider::{
    BackendError, BackendRequest, GenerationBackend, GenerationEvent, GenerationOptions,
    GenerationStream,
};
pub use providers::OllamaProvider;
