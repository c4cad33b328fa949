//! Chat task registry - tracks running chat turns so they can be cancelled

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Running chat turn
pub struct ChatTask {
    pub session_id: String,
    pub message_id: String,
    pub cancel_token: CancellationToken,
}

/// Registry of running turns, keyed by assistant message id
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, ChatTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new chat task
    pub fn register(&self, message_id: String, session_id: String, cancel_token: CancellationToken) {
        self.tasks.insert(
            message_id.clone(),
            ChatTask {
                session_id,
                message_id,
                cancel_token,
            },
        );
    }

    /// Remove a task from the registry
    pub fn remove(&self, message_id: &str) {
        self.tasks.remove(message_id);
    }

    /// Cancel and remove tasks for a session; returns how many were cancelled
    pub fn cancel_session_tasks(&self, session_id: &str) -> usize {
        let tasks_to_cancel: Vec<String> = self
            .tasks
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| entry.message_id.clone())
            .collect();

        let mut cancelled = 0;
        for message_id in tasks_to_cancel {
            if let Some((_, task)) = self.tasks.remove(&message_id) {
                task.cancel_token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Check if there's an active task for a session
    pub fn is_session_processing(&self, session_id: &str) -> bool {
        self.tasks.iter().any(|entry| entry.session_id == session_id)
    }

    /// Session of a running task, if any
    pub fn session_of(&self, message_id: &str) -> Option<String> {
        self.tasks.get(message_id).map(|task| task.session_id.clone())
    }

    /// Cancel a specific task by message_id
    pub fn cancel(&self, message_id: &str) -> bool {
        match self.tasks.remove(message_id) {
            Some((_, task)) => {
                task.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
