// File attachment repository for chat-relay
// Tracks uploaded files and the messages they belong to

use anyhow::{Context, Result};
use rusqlite::{Connection, Row, params};

use super::models::FileAttachment;
use super::DatabaseManager;

impl DatabaseManager {
    /// Save a file attachment record
    pub fn save_file_attachment(&self, attachment: &FileAttachment) -> Result<()> {
        self.with_connection(|conn| {
            save_file_attachment_impl(conn, attachment)
        })
    }

    /// Get a single attachment by ID
    pub fn get_file_attachment(&self, attachment_id: &str) -> Result<Option<FileAttachment>> {
        self.with_connection(|conn| {
            get_file_attachment_impl(conn, attachment_id)
        })
    }

    /// Get the attachments of a message
    pub fn get_attachments_by_message(&self, message_id: &str) -> Result<Vec<FileAttachment>> {
        self.with_connection(|conn| {
            get_attachments_by_message_impl(conn, message_id)
        })
    }

    /// Delete an attachment record (the file on disk is the caller's concern)
    pub fn delete_file_attachment(&self, attachment_id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            delete_file_attachment_impl(conn, attachment_id)
        })
    }

    /// Find an attachment whose message lives in a session owned by the user
    pub fn find_owned_attachment(&self, attachment_id: &str, user_id: &str) -> Result<Option<FileAttachment>> {
        self.with_connection(|conn| {
            find_owned_attachment_impl(conn, attachment_id, user_id)
        })
    }

    /// File paths of every attachment in a session
    pub fn get_attachment_paths_by_session(&self, session_id: &str) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            get_attachment_paths_by_session_impl(conn, session_id)
        })
    }
}

fn row_to_attachment(row: &Row<'_>) -> rusqlite::Result<FileAttachment> {
    Ok(FileAttachment {
        id: row.get(0)?,
        message_id: row.get(1)?,
        file_name: row.get(2)?,
        file_type: row.get(3)?,
        file_path: row.get(4)?,
        file_size: row.get(5)?,
        uploaded_at: row.get(6)?,
    })
}

fn save_file_attachment_impl(conn: &Connection, attachment: &FileAttachment) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO file_attachments (
            id, message_id, file_name, file_type, file_path, file_size, uploaded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            attachment.id,
            attachment.message_id,
            attachment.file_name,
            attachment.file_type,
            attachment.file_path,
            attachment.file_size,
            attachment.uploaded_at,
        ],
    ).context("Failed to save file attachment")?;

    Ok(())
}

fn get_file_attachment_impl(conn: &Connection, attachment_id: &str) -> Result<Option<FileAttachment>> {
    let result = conn.query_row(
        r#"
        SELECT id, message_id, file_name, file_type, file_path, file_size, uploaded_at
        FROM file_attachments
        WHERE id = ?
        "#,
        params![attachment_id],
        row_to_attachment,
    );

    match result {
        Ok(attachment) => Ok(Some(attachment)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get file attachment"),
    }
}

fn get_attachments_by_message_impl(conn: &Connection, message_id: &str) -> Result<Vec<FileAttachment>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, message_id, file_name, file_type, file_path, file_size, uploaded_at
        FROM file_attachments
        WHERE message_id = ?
        ORDER BY uploaded_at ASC
        "#
    ).context("Failed to prepare get_attachments_by_message query")?;

    let attachments = stmt.query_map(params![message_id], row_to_attachment)
        .context("Failed to query file attachments")?;

    attachments.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect file attachments")
}

fn delete_file_attachment_impl(conn: &Connection, attachment_id: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM file_attachments WHERE id = ?",
        params![attachment_id],
    ).context("Failed to delete file attachment")?;

    Ok(deleted > 0)
}

fn find_owned_attachment_impl(conn: &Connection, attachment_id: &str, user_id: &str) -> Result<Option<FileAttachment>> {
    let result = conn.query_row(
        r#"
        SELECT f.id, f.message_id, f.file_name, f.file_type, f.file_path, f.file_size, f.uploaded_at
        FROM file_attachments f
        JOIN chat_messages m ON m.id = f.message_id
        JOIN chat_sessions s ON s.id = m.session_id
        WHERE f.id = ?1 AND s.user_id = ?2
        "#,
        params![attachment_id, user_id],
        row_to_attachment,
    );

    match result {
        Ok(attachment) => Ok(Some(attachment)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get owned file attachment"),
    }
}

fn get_attachment_paths_by_session_impl(conn: &Connection, session_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT f.file_path
        FROM file_attachments f
        JOIN chat_messages m ON m.id = f.message_id
        WHERE m.session_id = ?
        "#
    ).context("Failed to prepare get_attachment_paths_by_session query")?;

    let paths = stmt.query_map(params![session_id], |row| row.get(0))
        .context("Failed to query attachment paths")?;

    paths.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect attachment paths")
}
