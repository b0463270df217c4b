use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    notification::{NotificationKind, NotificationService},
    websocket::{
        presence::PresenceRegistry,
        types::{MessageReceivedPayload, ReadReceiptPayload, ServerEvent},
    },
};

use super::{
    message_dto::MAX_CONTENT_LENGTH, message_models::Message, message_repository::MessageStore,
};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
const PREVIEW_CHARS: usize = 100;

/// Direct messaging shared by the socket gateway and the REST surface.
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn MessageStore>,
    presence: PresenceRegistry,
    notifications: NotificationService,
    max_limit: i64,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        presence: PresenceRegistry,
        notifications: NotificationService,
        max_limit: i64,
    ) -> Self {
        Self {
            store,
            presence,
            notifications,
            max_limit: max_limit.max(1),
        }
    }

    /// Persist, then fan out to both parties. Nothing is emitted if the insert fails.
    pub async fn send(&self, sender_id: Uuid, recipient_id: Uuid, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation(
                "Message content cannot be empty".to_string(),
            ));
        }
        if content.chars().count() > MAX_CONTENT_LENGTH {
            return Err(AppError::Validation(format!(
                "Message content exceeds {} characters",
                MAX_CONTENT_LENGTH
            )));
        }

        let message = self.store.append(sender_id, recipient_id, content).await?;

        let event = ServerEvent::MessageReceived(MessageReceivedPayload {
            message: message.clone(),
        });
        let mut delivered = self.presence.emit(&sender_id, event.clone());
        if recipient_id != sender_id {
            delivered += self.presence.emit(&recipient_id, event);
            self.notify_recipient(&message).await;
        }
        debug!(
            "Message {} delivered to {} live connection(s)",
            message.id, delivered
        );

        Ok(message)
    }

    async fn notify_recipient(&self, message: &Message) {
        let kind = NotificationKind::Message {
            message_id: message.id,
            preview: message.preview(PREVIEW_CHARS),
        };

        if let Err(e) = self
            .notifications
            .create_notification(message.recipient_id, Some(message.sender_id), kind)
            .await
        {
            warn!("Failed to notify recipient of message {}: {}", message.id, e);
        }
    }

    /// Newest first, at most `limit` messages created strictly before `before`.
    pub async fn conversation(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, self.max_limit);
        self.store.query(user_id, peer_id, before, limit).await
    }

    /// Mark everything `peer_id` sent to `user_id` as read and tell the peer.
    pub async fn mark_conversation_read(&self, user_id: Uuid, peer_id: Uuid) -> Result<u64> {
        let updated = self.store.mark_read(user_id, peer_id).await?;

        self.presence.emit(
            &peer_id,
            ServerEvent::ReadReceipt(ReadReceiptPayload {
                by: user_id,
                count: updated,
            }),
        );

        Ok(updated)
    }

    /// Ephemeral relay; dropped when the recipient has no open connection.
    pub fn relay(&self, recipient_id: Uuid, event: ServerEvent) {
        if self.presence.emit(&recipient_id, event) == 0 {
            debug!("Dropped ephemeral event for offline user {}", recipient_id);
        }
    }
}
