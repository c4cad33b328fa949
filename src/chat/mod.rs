//! Chat module for streamed conversations with a local model
//!
//! This module provides:
//! - Persistent chat history stored in SQLite
//! - A relay that streams backend tokens to callers as they arrive
//! - Cancellable turns
//! - Transport-independent session and message commands
//!
//! Module structure:
//! - types.rs: RelayEvent, request bodies, TurnInput
//! - prompt.rs: language detection and prompt templates
//! - store.rs: ChatStore, the persistence seam of a turn
//! - task_registry.rs: running turns and their cancel tokens
//! - relay.rs: ChatRelay, one spawned task per turn
//! - session_commands.rs: session CRUD
//! - message_commands.rs: send and cancel

pub mod types;
pub mod prompt;
pub mod store;
pub mod task_registry;
pub mod relay;
pub mod session_commands;
pub mod message_commands;

pub use types::{
    CancelResponse, ChatMessageRequest, CreateSessionRequest, ImageUpload, MessageView, RelayEvent,
    StreamPayload, TurnInput, UpdateSessionRequest,
};
pub use relay::{ChatRelay, RelayStream};
pub use store::ChatStore;
pub use task_registry::TaskRegistry;
