use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{error::Result, message::message_models::Message};

/// Append-only conversation storage with keyset pagination and read state.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, stamping its creation time server-side.
    async fn append(&self, sender_id: Uuid, recipient_id: Uuid, content: &str) -> Result<Message>;

    /// Messages between two users in either direction, newest first.
    async fn query(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Message>>;

    /// Set `read_at` on every unread message `peer_id` sent to `user_id`.
    /// Returns how many messages changed.
    async fn mark_read(&self, user_id: Uuid, peer_id: Uuid) -> Result<u64>;
}

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn append(&self, sender_id: Uuid, recipient_id: Uuid, content: &str) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (sender_id, recipient_id, content)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(sender_id)
        .bind(recipient_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    async fn query(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages
             WHERE ((sender_id = $1 AND recipient_id = $2)
                OR (sender_id = $2 AND recipient_id = $1))
               AND ($3::timestamptz IS NULL OR created_at < $3)
             ORDER BY created_at DESC
             LIMIT $4",
        )
        .bind(user_id)
        .bind(peer_id)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn mark_read(&self, user_id: Uuid, peer_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages
             SET read_at = NOW()
             WHERE recipient_id = $1 AND sender_id = $2 AND read_at IS NULL",
        )
        .bind(user_id)
        .bind(peer_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
