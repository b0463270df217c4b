use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{message::message_models::Message, notification::notification_models::Notification};

/// Server-to-client frames: `{"event": "<name>", "data": {..}}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    MessageReceived(MessageReceivedPayload),
    Typing(TypingPayload),
    StopTyping(TypingPayload),
    ReadReceipt(ReadReceiptPayload),
    Notification(NotificationPayload),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageReceivedPayload {
    pub message: Message,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypingPayload {
    pub from: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadReceiptPayload {
    pub by: Uuid,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub actor: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationPayload {
    fn from(notification: &Notification) -> Self {
        Self {
            id: notification.id,
            kind: notification.kind.type_name().to_string(),
            payload: notification.kind.payload(),
            actor: notification.actor_id,
            created_at: notification.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

// Client-to-server frames
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage { to: Uuid, content: String },
    Typing { to: Uuid },
    StopTyping { to: Uuid },
    #[serde(rename_all = "camelCase")]
    MarkConversationRead { peer_id: Uuid },
}
