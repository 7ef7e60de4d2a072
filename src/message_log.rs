//! Append-only audit log of observed platform messages.
//!
//! Lives in its own database file, separate from the moderation store. Rows
//! are never updated or deleted here, and duplicate platform ids are kept as
//! separate rows (one row per observed event, edits included).

use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::moderation::StoreError;

/// One observed platform message.
#[derive(Debug, Clone)]
pub struct LoggedMessage {
    /// Platform message id. Not unique in the log.
    pub id: i64,
    /// None for direct messages.
    pub guild_id: Option<i64>,
    pub channel_id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub author_display_name: String,
    pub content: String,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub jump_url: String,
    /// Mentioned user ids, in message order.
    pub mentions: Vec<i64>,
    /// Platform message type code.
    pub message_type: i64,
    pub webhook_id: Option<i64>,
}

/// The message log store.
pub struct MessageLog {
    conn: Mutex<Connection>,
}

impl MessageLog {
    /// Create an in-memory log.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open (or create) the log at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let log = Self::from_connection(Connection::open(path)?)?;
        info!("Opened message log at {:?}", path);
        Ok(log)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS log_message (
                id INTEGER,
                guild_id INTEGER,
                channel_id INTEGER,
                author_id INTEGER,
                author_name TEXT,
                author_display_name TEXT,
                content TEXT,
                created_at TEXT,
                edited_at TEXT,
                jump_url TEXT,
                mentions TEXT,
                type INTEGER,
                webhook_id INTEGER
            );
        "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one message. Plain insert; nothing is deduplicated.
    pub fn log(&self, msg: &LoggedMessage) -> Result<(), StoreError> {
        let mentions = serde_json::to_string(&msg.mentions)
            .expect("a list of integers always serializes");

        let conn = self.conn.lock().expect("connection lock poisoned");
        conn.execute(
            "INSERT INTO log_message(
                id, guild_id, channel_id, author_id, author_name,
                author_display_name, content, created_at, edited_at,
                jump_url, mentions, type, webhook_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                msg.id,
                msg.guild_id,
                msg.channel_id,
                msg.author_id,
                msg.author_name,
                msg.author_display_name,
                msg.content,
                msg.created_at,
                msg.edited_at,
                msg.jump_url,
                mentions,
                msg.message_type,
                msg.webhook_id,
            ],
        )?;
        Ok(())
    }

    #[cfg(test)]
    fn count(&self) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM log_message", [], |row| row.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }
}
