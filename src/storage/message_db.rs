use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use std::path::Path;
use uuid::Uuid;

use super::database::Database;
use crate::common::clock::{from_millis, to_millis};
use crate::common::{DeliveryStatus, Message, NewMessage};
use crate::error::ChatResult;

const MESSAGE_COLUMNS: &str =
    "seq, id, sender, receiver, text, attachment_key, status, is_admin, order_id, timestamp, read_at";

/// Row selection for bulk status updates. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub id: Option<String>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
}

impl MessageFilter {
    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn sender(mut self, sender: &str) -> Self {
        self.sender = Some(sender.to_string());
        self
    }

    pub fn receiver(mut self, receiver: &str) -> Self {
        self.receiver = Some(receiver.to_string());
        self
    }
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        seq: row.get(0)?,
        id: row.get(1)?,
        sender: row.get(2)?,
        receiver: row.get(3)?,
        text: row.get(4)?,
        attachment_key: row.get(5)?,
        status: row.get(6)?,
        is_admin: row.get::<_, i64>(7)? != 0,
        order_id: row.get(8)?,
        timestamp: from_millis(row.get(9)?),
        read_at: row.get::<_, Option<i64>>(10)?.map(from_millis),
    })
}

/// Durable message log.
pub struct MessageDatabase {
    db: Database,
}

impl MessageDatabase {
    /// Open the message log at a custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> ChatResult<Self> {
        let message_db = Self {
            db: Database::new(path)?,
        };
        message_db.init_schema()?;
        Ok(message_db)
    }

    pub fn in_memory() -> ChatResult<Self> {
        let message_db = Self {
            db: Database::in_memory()?,
        };
        message_db.init_schema()?;
        Ok(message_db)
    }

    fn init_schema(&self) -> ChatResult<()> {
        let conn = self.db.connection()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                sender TEXT NOT NULL,
                receiver TEXT NOT NULL,
                text TEXT NOT NULL DEFAULT '',
                attachment_key TEXT,
                status TEXT NOT NULL DEFAULT 'sent'
                    CHECK (status IN ('sent', 'delivered', 'read')),
                is_admin INTEGER NOT NULL DEFAULT 0,
                order_id TEXT,
                timestamp INTEGER NOT NULL,
                read_at INTEGER,
                CHECK (sender <> receiver),
                CHECK (length(text) > 0 OR length(COALESCE(attachment_key, '')) > 0)
            );
            CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
            CREATE INDEX IF NOT EXISTS idx_messages_sender_ts ON messages(sender, timestamp);
            CREATE INDEX IF NOT EXISTS idx_messages_receiver_ts ON messages(receiver, timestamp);
            CREATE INDEX IF NOT EXISTS idx_messages_receiver_status ON messages(receiver, status);
            CREATE INDEX IF NOT EXISTS idx_messages_order_ts ON messages(order_id, timestamp);",
        )?;
        Ok(())
    }

    /// Append a message and return it with its assigned id and sequence.
    pub fn insert(&self, message: &NewMessage) -> ChatResult<Message> {
        let id = Uuid::new_v4().to_string();
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO messages
             (id, sender, receiver, text, attachment_key, status, is_admin, order_id, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                message.sender,
                message.receiver,
                message.text,
                message.attachment_key,
                message.status,
                message.is_admin as i64,
                message.order_id,
                to_millis(message.timestamp),
            ],
        )?;
        let seq = conn.last_insert_rowid();

        Ok(Message {
            id,
            seq,
            sender: message.sender.clone(),
            receiver: message.receiver.clone(),
            text: message.text.clone(),
            attachment_key: message.attachment_key.clone(),
            status: message.status,
            is_admin: message.is_admin,
            order_id: message.order_id.clone(),
            timestamp: from_millis(to_millis(message.timestamp)),
            read_at: None,
        })
    }

    pub fn get(&self, id: &str) -> ChatResult<Option<Message>> {
        let conn = self.db.connection()?;
        let message = conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Move every matching message that is strictly behind `target` up to
    /// `target` in one statement. Entering `read` stamps `read_at`.
    /// Returns the number of rows changed; rows already at or past the
    /// target are left alone.
    pub fn advance_status(
        &self,
        filter: &MessageFilter,
        target: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> ChatResult<usize> {
        let predecessors = target.predecessors();
        if predecessors.is_empty() {
            return Ok(0);
        }

        let status_list = predecessors
            .iter()
            .map(|status| format!("'{}'", status.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut values = vec![
            Value::Text(target.as_str().to_string()),
            Value::Integer(to_millis(at)),
        ];
        let mut sql = format!(
            "UPDATE messages
             SET status = ?1,
                 read_at = CASE WHEN ?1 = 'read' THEN COALESCE(read_at, ?2) ELSE read_at END
             WHERE status IN ({status_list})"
        );
        for (column, value) in [
            ("id", &filter.id),
            ("sender", &filter.sender),
            ("receiver", &filter.receiver),
        ] {
            if let Some(value) = value {
                values.push(Value::Text(value.clone()));
                sql.push_str(&format!(" AND {column} = ?{}", values.len()));
            }
        }

        let conn = self.db.connection()?;
        let changed = conn.execute(&sql, params_from_iter(values))?;
        Ok(changed)
    }

    /// Whether `identity` sent or received anything at or after `since`.
    pub fn has_activity_since(&self, identity: &str, since: DateTime<Utc>) -> ChatResult<bool> {
        let conn = self.db.connection()?;
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM messages
                WHERE (sender = ?1 OR receiver = ?1) AND timestamp >= ?2
             )",
            params![identity, to_millis(since)],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    /// Latest `limit` messages involving `identity`, newest first.
    pub fn recent_involving(&self, identity: &str, limit: usize) -> ChatResult<Vec<Message>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE sender = ?1 OR receiver = ?1
             ORDER BY timestamp DESC, seq DESC
             LIMIT ?2"
        ))?;
        let messages = stmt
            .query_map(params![identity, limit as i64], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Feed every message to `visit`, newest first.
    pub fn scan_newest_first<F>(&self, mut visit: F) -> ChatResult<()>
    where
        F: FnMut(Message),
    {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY timestamp DESC, seq DESC"
        ))?;
        let rows = stmt.query_map([], row_to_message)?;
        for row in rows {
            visit(row?);
        }
        Ok(())
    }
}
