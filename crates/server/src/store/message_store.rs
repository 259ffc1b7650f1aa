//! SQLite-backed message log
//!
//! Messages are only ever inserted. SQLite assigns the id atomically per
//! row, so concurrent appends need no cross-record locking.

use chat_common::{IdentityId, Message, MessageId};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

use crate::directory::Directory;
use crate::error::{Error, Result};

type MessageRow = (i64, String, String, String, i64);

fn message_from_row((id, sender_id, receiver_id, text, created_at_us): MessageRow) -> Result<Message> {
    let created_at = DateTime::<Utc>::from_timestamp_micros(created_at_us)
        .ok_or_else(|| Error::Internal(format!("Corrupt timestamp on message {id}")))?;
    Ok(Message {
        id: MessageId(id),
        sender_id: IdentityId::new(sender_id),
        receiver_id: IdentityId::new(receiver_id),
        text,
        created_at,
    })
}

pub struct MessageStore {
    pool: SqlitePool,
    directory: Arc<dyn Directory>,
}

impl MessageStore {
    pub fn new(pool: SqlitePool, directory: Arc<dyn Directory>) -> Self {
        Self { pool, directory }
    }

    /// Persist a new message, assigning its id and creation time
    pub async fn append(
        &self,
        sender: &IdentityId,
        receiver: &IdentityId,
        text: &str,
    ) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(Error::Validation("Message text must not be empty".into()));
        }
        if sender == receiver {
            return Err(Error::Validation("Cannot send a message to yourself".into()));
        }
        for id in [sender, receiver] {
            if self.directory.lookup(id).await?.is_none() {
                return Err(Error::NotFound(format!("Unknown identity: {id}")));
            }
        }

        // Stored at microsecond precision; the returned value must match reads
        let created_at_us = Utc::now().timestamp_micros();

        let id = sqlx::query(
            "INSERT INTO messages (sender_id, receiver_id, text, created_at_us) VALUES (?, ?, ?, ?)",
        )
        .bind(sender.as_str())
        .bind(receiver.as_str())
        .bind(text)
        .bind(created_at_us)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        let message = message_from_row((
            id,
            sender.to_string(),
            receiver.to_string(),
            text.to_string(),
            created_at_us,
        ))?;

        info!("Stored message {} from {} to {}", message.id, sender, receiver);

        Ok(message)
    }

    /// All messages between `a` and `b`, either direction, ordered by
    /// `(created_at, id)`. Every call reads a fresh snapshot.
    pub async fn history(&self, a: &IdentityId, b: &IdentityId) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, sender_id, receiver_id, text, created_at_us
            FROM messages
            WHERE (sender_id = ? AND receiver_id = ?)
               OR (sender_id = ? AND receiver_id = ?)
            ORDER BY created_at_us ASC, id ASC
            "#,
        )
        .bind(a.as_str())
        .bind(b.as_str())
        .bind(b.as_str())
        .bind(a.as_str())
        .fetch_all(&self.pool)
        .await?;

        debug!("History {} <-> {}: {} messages", a, b, rows.len());

        rows.into_iter().map(message_from_row).collect()
    }

    /// Fetch one persisted message by id
    pub async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, sender_id, receiver_id, text, created_at_us FROM messages WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(message_from_row).transpose()
    }
}
