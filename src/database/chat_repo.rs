// Chat repository for chat-relay
// Handles CRUD operations for chat messages

use anyhow::{Context, Result};
use rusqlite::{Connection, Row, params};

use super::models::{ChatMessage, ChatMessageStatus, ChatRole};
use super::DatabaseManager;

impl DatabaseManager {
    /// Get all chat messages for a session
    pub fn get_chat_messages_by_session(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.with_connection(|conn| {
            get_chat_messages_by_session_impl(conn, session_id)
        })
    }

    /// Get the last `limit` completed, non-empty messages of a session, oldest first
    pub fn get_recent_context_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        self.with_connection(|conn| {
            get_recent_context_messages_impl(conn, session_id, limit)
        })
    }

    /// Insert a turn's user message and assistant placeholder at the next two
    /// sequence ids of the session. Both ids are written back into the messages.
    pub fn insert_turn_messages(&self, user: &mut ChatMessage, assistant: &mut ChatMessage) -> Result<()> {
        self.with_connection(|conn| {
            insert_turn_messages_impl(conn, user, assistant)
        })
    }

    /// Write the final text of an assistant message and mark it complete
    pub fn complete_assistant_message(&self, message_id: &str, content: &str) -> Result<()> {
        self.with_connection(|conn| {
            complete_assistant_message_impl(conn, message_id, content)
        })
    }

    /// Update the status of a chat message
    pub fn update_chat_message_status(
        &self,
        message_id: &str,
        status: ChatMessageStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.with_connection(|conn| {
            update_chat_message_status_impl(conn, message_id, status, error_message)
        })
    }

    /// Count the messages in a session
    pub fn count_chat_messages(&self, session_id: &str) -> Result<i64> {
        self.with_connection(|conn| {
            count_chat_messages_impl(conn, session_id)
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, session_id, role, content, created_at, sequence_id, status, error_message, model_id";

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: ChatRole::from_str(&row.get::<_, String>(2)?),
        content: row.get(3)?,
        created_at: row.get(4)?,
        sequence_id: row.get(5)?,
        status: ChatMessageStatus::from_str(&row.get::<_, String>(6)?),
        error_message: row.get(7)?,
        model_id: row.get(8)?,
    })
}

fn save_chat_message_impl(conn: &Connection, message: &ChatMessage) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO chat_messages (
            id, session_id, role, content, created_at,
            sequence_id, status, error_message, model_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            content = excluded.content,
            status = excluded.status,
            error_message = excluded.error_message,
            model_id = excluded.model_id
        "#,
        params![
            message.id,
            message.session_id,
            message.role.as_str(),
            message.content,
            message.created_at,
            message.sequence_id,
            message.status.as_str(),
            message.error_message,
            message.model_id,
        ],
    ).context("Failed to save chat message")?;

    Ok(())
}

fn get_chat_messages_by_session_impl(conn: &Connection, session_id: &str) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM chat_messages WHERE session_id = ? ORDER BY sequence_id ASC",
        MESSAGE_COLUMNS
    )).context("Failed to prepare get_chat_messages_by_session query")?;

    let messages = stmt.query_map(params![session_id], row_to_message)
        .context("Failed to query chat messages")?;

    messages.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect chat messages")
}

fn get_recent_context_messages_impl(conn: &Connection, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {} FROM chat_messages
        WHERE session_id = ? AND status = 'complete' AND content != ''
        ORDER BY sequence_id DESC LIMIT ?
        "#,
        MESSAGE_COLUMNS
    )).context("Failed to prepare get_recent_context_messages query")?;

    let messages = stmt.query_map(params![session_id, limit as i64], row_to_message)
        .context("Failed to query recent chat messages")?;

    let mut messages = messages.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect recent chat messages")?;
    messages.reverse();
    Ok(messages)
}

fn get_next_chat_sequence_id_for_session_impl(conn: &Connection, session_id: &str) -> Result<i64> {
    let max_seq: Option<i64> = conn.query_row(
        "SELECT MAX(sequence_id) FROM chat_messages WHERE session_id = ?",
        params![session_id],
        |row| row.get(0),
    ).context("Failed to get max sequence_id for session")?;

    Ok(max_seq.unwrap_or(0) + 1)
}

fn insert_turn_messages_impl(conn: &Connection, user: &mut ChatMessage, assistant: &mut ChatMessage) -> Result<()> {
    let tx = conn.unchecked_transaction()
        .context("Failed to start transaction")?;

    let next = get_next_chat_sequence_id_for_session_impl(&tx, &user.session_id)?;
    user.sequence_id = next;
    assistant.sequence_id = next + 1;
    save_chat_message_impl(&tx, user)?;
    save_chat_message_impl(&tx, assistant)?;

    tx.commit().context("Failed to commit turn messages")?;
    Ok(())
}

fn complete_assistant_message_impl(conn: &Connection, message_id: &str, content: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE chat_messages SET content = ?, status = 'complete', error_message = NULL WHERE id = ?",
        params![content, message_id],
    ).context("Failed to complete assistant message")?;

    if updated == 0 {
        anyhow::bail!("Assistant message {} no longer exists", message_id);
    }
    Ok(())
}

fn update_chat_message_status_impl(
    conn: &Connection,
    message_id: &str,
    status: ChatMessageStatus,
    error_message: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE chat_messages SET status = ?, error_message = ? WHERE id = ?",
        params![status.as_str(), error_message, message_id],
    ).context("Failed to update chat message status")?;

    Ok(())
}

fn count_chat_messages_impl(conn: &Connection, session_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM chat_messages WHERE session_id = ?",
        params![session_id],
        |row| row.get(0),
    ).context("Failed to count chat messages")
}

/// Row-level access for fixtures
#[cfg(test)]
impl DatabaseManager {
    /// Save a chat message (insert, or update the mutable fields of an existing row)
    pub fn save_chat_message(&self, message: &ChatMessage) -> Result<()> {
        self.with_connection(|conn| {
            save_chat_message_impl(conn, message)
        })
    }

    /// Get a single chat message by ID
    pub fn get_chat_message(&self, message_id: &str) -> Result<Option<ChatMessage>> {
        self.with_connection(|conn| {
            let result = conn.query_row(
                &format!("SELECT {} FROM chat_messages WHERE id = ?", MESSAGE_COLUMNS),
                params![message_id],
                row_to_message,
            );

            match result {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e).context("Failed to get chat message"),
            }
        })
    }
}
