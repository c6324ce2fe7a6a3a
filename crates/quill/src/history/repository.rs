//! Repository for conversation history operations.

use anyhow::{Context, Result};
use chrono::Utc;
use quill_protocol::{ChatMessage, Role};

use crate::db::Database;

/// Database row for a message. Converted to the wire type on read.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    role: String,
    content: String,
    timestamp: i64,
}

impl MessageRow {
    fn into_message(self) -> Result<ChatMessage> {
        let role: Role = self
            .role
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("reading message row")?;
        Ok(ChatMessage::new(role, self.content, self.timestamp))
    }
}

/// Store for ordered, append-only conversation history per user key.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    db: Database,
}

impl HistoryStore {
    /// Create a new store over a database handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one message for `user_id` and return it as persisted.
    pub async fn append(&self, user_id: &str, role: Role, content: &str) -> Result<ChatMessage> {
        let timestamp = Utc::now().timestamp_millis();
        let role_str = role.to_string();

        sqlx::query(
            r#"
            INSERT INTO messages (user_id, role, content, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&role_str)
        .bind(content)
        .bind(timestamp)
        .execute(self.db.pool())
        .await
        .context("inserting message")?;

        Ok(ChatMessage::new(role, content, timestamp))
    }

    /// All messages for `user_id` in insertion order.
    pub async fn list(&self, user_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT role, content, timestamp
            FROM messages
            WHERE user_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await
        .context("fetching messages")?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    /// Delete all messages for `user_id`. Idempotent; returns rows removed.
    pub async fn clear(&self, user_id: &str) -> Result<i64> {
        let result = sqlx::query("DELETE FROM messages WHERE user_id = ?")
            .bind(user_id)
            .execute(self.db.pool())
            .await
            .context("clearing messages")?;

        Ok(result.rows_affected() as i64)
    }
}
