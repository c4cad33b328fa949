pub mod commands;
pub mod storage;

pub use storage::{FileStorage, StoredFile};
