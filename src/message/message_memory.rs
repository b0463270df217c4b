use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::Result,
    message::{message_models::Message, message_repository::MessageStore},
};

/// Process-local conversation store for development and tests.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn between(message: &Message, a: Uuid, b: Uuid) -> bool {
    (message.sender_id == a && message.recipient_id == b)
        || (message.sender_id == b && message.recipient_id == a)
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, sender_id: Uuid, recipient_id: Uuid, content: &str) -> Result<Message> {
        let mut messages = self.messages.write().await;

        // Creation times stay strictly increasing even when the clock doesn't move.
        let mut created_at = Utc::now();
        if let Some(last) = messages.last() {
            if created_at <= last.created_at {
                created_at = last.created_at + Duration::microseconds(1);
            }
        }

        let message = Message {
            id: Uuid::new_v4(),
            sender_id,
            recipient_id,
            content: content.to_string(),
            created_at,
            read_at: None,
        };
        messages.push(message.clone());

        Ok(message)
    }

    async fn query(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let messages = self.messages.read().await;

        let page = messages
            .iter()
            .rev()
            .filter(|m| between(m, user_id, peer_id))
            .filter(|m| before.map_or(true, |b| m.created_at < b))
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok(page)
    }

    async fn mark_read(&self, user_id: Uuid, peer_id: Uuid) -> Result<u64> {
        let mut messages = self.messages.write().await;
        let now = Utc::now();
        let mut updated = 0;

        for message in messages
            .iter_mut()
            .filter(|m| m.recipient_id == user_id && m.sender_id == peer_id && m.read_at.is_none())
        {
            message.read_at = Some(now);
            updated += 1;
        }

        Ok(updated)
    }
}
