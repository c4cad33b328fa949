// Chat session repository for chat-relay
// Handles CRUD operations for chat sessions

use anyhow::{Context, Result};
use rusqlite::{Connection, Row, params};

use super::models::{ChatSession, SessionSummary};
use super::DatabaseManager;

const SESSION_COLUMNS: &str = "id, user_id, title, status, created_at, updated_at";

impl DatabaseManager {
    /// Create a new chat session
    pub fn create_chat_session(&self, session: &ChatSession) -> Result<String> {
        self.with_connection(|conn| {
            create_chat_session_impl(conn, session)
        })
    }

    /// List a user's sessions, most recently active first
    pub fn list_user_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        self.with_connection(|conn| {
            list_user_sessions_impl(conn, user_id)
        })
    }

    /// Find a session by ID, only if it belongs to the given user
    pub fn find_owned_session(&self, session_id: &str, user_id: &str) -> Result<Option<ChatSession>> {
        self.with_connection(|conn| {
            find_owned_session_impl(conn, session_id, user_id)
        })
    }

    /// Update a chat session's title
    pub fn update_chat_session_title(&self, session_id: &str, title: &str) -> Result<()> {
        self.with_connection(|conn| {
            update_chat_session_title_impl(conn, session_id, title)
        })
    }

    /// Bump a session's last-activity timestamp
    pub fn touch_chat_session(&self, session_id: &str) -> Result<()> {
        self.with_connection(|conn| {
            touch_chat_session_impl(conn, session_id)
        })
    }

    /// Delete a chat session; messages and attachments cascade
    pub fn delete_chat_session(&self, session_id: &str) -> Result<()> {
        self.with_connection(|conn| {
            delete_chat_session_impl(conn, session_id)
        })
    }
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn create_chat_session_impl(conn: &Connection, session: &ChatSession) -> Result<String> {
    conn.execute(
        r#"
        INSERT INTO chat_sessions (id, user_id, title, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            session.id,
            session.user_id,
            session.title,
            session.status,
            session.created_at,
            session.updated_at,
        ],
    ).context("Failed to create chat session")?;

    Ok(session.id.clone())
}

fn list_user_sessions_impl(conn: &Connection, user_id: &str) -> Result<Vec<SessionSummary>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT s.id, s.user_id, s.title, s.status, s.created_at, s.updated_at,
               (SELECT COUNT(*) FROM chat_messages m WHERE m.session_id = s.id)
        FROM chat_sessions s
        WHERE s.user_id = ?
        ORDER BY s.updated_at DESC, s.created_at DESC
        "#
    ).context("Failed to prepare list_user_sessions query")?;

    let sessions = stmt.query_map(params![user_id], |row| {
        Ok(SessionSummary {
            session: row_to_session(row)?,
            message_count: row.get(6)?,
        })
    }).context("Failed to query chat sessions")?;

    sessions.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect chat sessions")
}

fn find_owned_session_impl(conn: &Connection, session_id: &str, user_id: &str) -> Result<Option<ChatSession>> {
    let result = conn.query_row(
        &format!("SELECT {} FROM chat_sessions WHERE id = ?1 AND user_id = ?2", SESSION_COLUMNS),
        params![session_id, user_id],
        row_to_session,
    );

    match result {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get chat session"),
    }
}

fn update_chat_session_title_impl(conn: &Connection, session_id: &str, title: &str) -> Result<()> {
    conn.execute(
        "UPDATE chat_sessions SET title = ?, updated_at = ? WHERE id = ?",
        params![title, chrono::Utc::now().to_rfc3339(), session_id],
    ).context("Failed to update chat session title")?;

    Ok(())
}

fn touch_chat_session_impl(conn: &Connection, session_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE chat_sessions SET updated_at = ? WHERE id = ?",
        params![chrono::Utc::now().to_rfc3339(), session_id],
    ).context("Failed to touch chat session")?;

    Ok(())
}

fn delete_chat_session_impl(conn: &Connection, session_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM chat_sessions WHERE id = ?",
        params![session_id],
    ).context("Failed to delete chat session")?;

    Ok(())
}
